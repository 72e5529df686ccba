//! Scan check registry
//!
//! Check names appear as keys in scan reports and in `refaudit.toml`.
//! They are stable - never rename them.

use serde::{Deserialize, Serialize};

/// A selectable anomaly check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    IsolatedTables,
    FalseForeignKeys,
    OrphanRecords,
    MissingForeignKeys,
    UndefinedActions,
    UnindexedForeignKeys,
    DuplicatePrimaryKeys,
    TypeMismatches,
    NullabilityMismatches,
}

impl CheckKind {
    /// Every check, in the order a full scan runs them
    pub const ALL: [CheckKind; 9] = [
        CheckKind::IsolatedTables,
        CheckKind::FalseForeignKeys,
        CheckKind::OrphanRecords,
        CheckKind::MissingForeignKeys,
        CheckKind::UndefinedActions,
        CheckKind::UnindexedForeignKeys,
        CheckKind::DuplicatePrimaryKeys,
        CheckKind::TypeMismatches,
        CheckKind::NullabilityMismatches,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsolatedTables => "isolated_tables",
            Self::FalseForeignKeys => "false_foreign_keys",
            Self::OrphanRecords => "orphan_records",
            Self::MissingForeignKeys => "missing_foreign_keys",
            Self::UndefinedActions => "undefined_actions",
            Self::UnindexedForeignKeys => "unindexed_foreign_keys",
            Self::DuplicatePrimaryKeys => "duplicate_primary_keys",
            Self::TypeMismatches => "type_mismatches",
            Self::NullabilityMismatches => "nullability_mismatches",
        }
    }

    /// Summary sentence for a check that found `count` anomalies
    pub fn explain(&self, count: usize) -> String {
        match self {
            Self::IsolatedTables => format!("{} table(s) are not referenced by any foreign key", count),
            Self::FalseForeignKeys => format!(
                "{} column(s) share a primary key's name in another table without being declared as foreign keys",
                count
            ),
            Self::OrphanRecords => format!(
                "{} foreign key column(s) have rows that reference missing parents or hold NULL",
                count
            ),
            Self::MissingForeignKeys => format!(
                "{} column(s) follow a foreign key naming convention but have no declared constraint",
                count
            ),
            Self::UndefinedActions => format!(
                "{} foreign key action(s) are left at the engine default",
                count
            ),
            Self::UnindexedForeignKeys => format!("{} foreign key column(s) have no supporting index", count),
            Self::DuplicatePrimaryKeys => format!("{} unique index(es) duplicate a primary key", count),
            Self::TypeMismatches => format!(
                "{} foreign key(s) differ in type or length from the referenced column",
                count
            ),
            Self::NullabilityMismatches => format!(
                "{} foreign key(s) differ in nullability from the referenced column",
                count
            ),
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|check| check.as_str() == wanted)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown check '{}'. Valid checks: {}", s, valid.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_names_round_trip_through_from_str() {
        for check in CheckKind::ALL {
            assert_eq!(check.as_str().parse::<CheckKind>(), Ok(check));
        }
        assert_eq!("type-mismatches".parse::<CheckKind>(), Ok(CheckKind::TypeMismatches));
        assert!("everything".parse::<CheckKind>().is_err());
    }

    #[test]
    fn explanation_mentions_count() {
        assert!(CheckKind::IsolatedTables.explain(3).starts_with("3 table(s)"));
    }
}
