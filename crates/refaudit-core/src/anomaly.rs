//! Anomaly records
//!
//! IMPORTANT: anomaly codes are stable. Add new kinds, never rename old ones.

use serde::{Deserialize, Serialize};

/// Kind of integrity anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// No foreign key anywhere references the table
    IsolatedTable,

    /// Column shares a primary key's name but is not declared as a foreign key
    FalseForeignKey,

    /// Child rows whose key matches no parent row
    OrphanRecord,

    /// Child rows whose foreign key is NULL
    NullViolation,

    /// Naming convention suggests a foreign key that is not declared
    MissingForeignKey,

    /// Foreign key column type or length differs from the referenced column
    TypeMismatch,

    /// Foreign key column nullability differs from the referenced column
    NullabilityMismatch,

    /// Foreign key column is not the leading column of any index
    UnindexedForeignKey,

    /// A unique index duplicates the primary key
    DuplicatePrimaryKey,

    /// Foreign key points at a table or column missing from the catalog
    DanglingReference,

    /// Foreign key leaves an ON UPDATE / ON DELETE action at the engine default
    UndefinedReferentialAction,
}

impl AnomalyKind {
    /// Stable string code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsolatedTable => "ISOLATED_TABLE",
            Self::FalseForeignKey => "FALSE_FOREIGN_KEY",
            Self::OrphanRecord => "ORPHAN_RECORD",
            Self::NullViolation => "NULL_VIOLATION",
            Self::MissingForeignKey => "MISSING_FOREIGN_KEY",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::NullabilityMismatch => "NULLABILITY_MISMATCH",
            Self::UnindexedForeignKey => "UNINDEXED_FOREIGN_KEY",
            Self::DuplicatePrimaryKey => "DUPLICATE_PRIMARY_KEY",
            Self::DanglingReference => "DANGLING_REFERENCE",
            Self::UndefinedReferentialAction => "UNDEFINED_REFERENTIAL_ACTION",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One detected anomaly
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub kind: AnomalyKind,

    /// Table the anomaly was found in
    pub table: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Other table involved (referenced parent, suspected parent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_table: Option<String>,

    /// Human-readable explanation
    pub detail: String,
}

impl AnomalyRecord {
    pub fn new(kind: AnomalyKind, table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            column: None,
            related_table: None,
            detail: detail.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_related_table(mut self, table: impl Into<String>) -> Self {
        self.related_table = Some(table.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_code_stability() {
        assert_eq!(AnomalyKind::IsolatedTable.as_str(), "ISOLATED_TABLE");
        assert_eq!(AnomalyKind::UnindexedForeignKey.as_str(), "UNINDEXED_FOREIGN_KEY");
        assert_eq!(
            serde_json::to_string(&AnomalyKind::FalseForeignKey).unwrap(),
            "\"FALSE_FOREIGN_KEY\""
        );
    }

    #[test]
    fn optional_fields_are_skipped() {
        let record = AnomalyRecord::new(AnomalyKind::IsolatedTable, "audit_notes", "not referenced");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("column"));
        assert!(!json.contains("related_table"));

        let record = record.with_column("note_id").with_related_table("notes");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"column\":\"note_id\""));
        assert!(json.contains("\"related_table\":\"notes\""));
    }
}
