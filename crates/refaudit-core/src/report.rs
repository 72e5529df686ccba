//! Result payloads (stable v1)
//!
//! These are the structures handed to whatever front end serializes them.
//! Breaking changes require a new report version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::anomaly::AnomalyRecord;
use crate::audit_log::AuditLogEntry;
use crate::catalog::{ForeignKeyMeta, ReferentialAction};
use crate::check::CheckKind;
use crate::error::{AuditError, ErrorKind};
use crate::mutation::{Operation, ResolvedValues};
use crate::scan_log::LogLine;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Overall outcome of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result of auditing one mutation statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationAuditResult {
    pub status: Status,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Assignments after reconciliation, or the predicate for deletes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_values: Option<ResolvedValues>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_statement: Option<String>,

    /// Statement that failed, for diagnosis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempted_statement: Option<String>,

    /// Values bound to the executed or attempted statement's `$n` placeholders
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statement_params: Vec<Option<String>>,

    /// Reconciled insert with values interpolated, whichever form ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_statement: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub injected_primary_key: Option<i64>,

    /// Most recent audit log row for this table and operation
    pub audit_log_entry: Option<AuditLogEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MutationAuditResult {
    /// A successful execution
    pub fn success(operation: Operation, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            status: Status::Success,
            message: format!("{} executed successfully on table {}", operation, table),
            error_kind: None,
            operation: Some(operation),
            table: Some(table),
            resolved_values: None,
            executed_statement: None,
            attempted_statement: None,
            statement_params: Vec::new(),
            corrected_statement: None,
            injected_primary_key: None,
            audit_log_entry: None,
            warnings: Vec::new(),
        }
    }

    /// A terminal failure
    pub fn failure(error: &AuditError) -> Self {
        Self {
            status: Status::Error,
            message: error.to_string(),
            error_kind: Some(error.kind()),
            operation: None,
            table: None,
            resolved_values: None,
            executed_statement: None,
            attempted_statement: error.attempted_statement().map(str::to_string),
            statement_params: Vec::new(),
            corrected_statement: None,
            injected_primary_key: None,
            audit_log_entry: None,
            warnings: Vec::new(),
        }
    }

    /// Attach the statement target
    pub fn with_target(mut self, operation: Operation, table: impl Into<String>) -> Self {
        self.operation = Some(operation);
        self.table = Some(table.into());
        self
    }

    pub fn with_resolved_values(mut self, values: ResolvedValues) -> Self {
        self.resolved_values = Some(values);
        self
    }

    /// Attach bind parameters and the literal rendering of the statement
    pub fn with_statement_detail(mut self, corrected: Option<String>, params: Vec<Option<String>>) -> Self {
        self.corrected_statement = corrected;
        self.statement_params = params;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Outcome of one scan check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub anomalies: Vec<AnomalyRecord>,

    /// Summary sentence, present when anomalies were found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    /// Why the check could not complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutcome {
    pub fn completed(check: CheckKind, anomalies: Vec<AnomalyRecord>) -> Self {
        let explanation = if anomalies.is_empty() {
            None
        } else {
            Some(check.explain(anomalies.len()))
        };
        Self {
            anomalies,
            explanation,
            error: None,
        }
    }

    pub fn failed(error: &AuditError) -> Self {
        Self {
            anomalies: Vec::new(),
            explanation: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregated anomaly scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub version: ReportVersion,

    /// Timestamp (RFC 3339)
    pub timestamp: String,

    pub status: Status,
    pub message: String,
    pub total_violations: usize,

    /// One explanation per check that found something
    pub violation_summary: Vec<String>,

    pub checks: BTreeMap<CheckKind, CheckOutcome>,

    /// Lines recorded while the scan ran
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<LogLine>,
}

impl ScanReport {
    pub fn from_outcomes(checks: BTreeMap<CheckKind, CheckOutcome>, log: Vec<LogLine>) -> Self {
        let total_violations = checks.values().map(|o| o.anomalies.len()).sum();
        let violation_summary = checks
            .values()
            .filter_map(|o| o.explanation.clone())
            .collect();
        let failed = checks.values().filter(|o| o.is_failed()).count();

        let (status, message) = if total_violations > 0 {
            (Status::Warning, "Referential integrity violations were found".to_string())
        } else if failed > 0 {
            (Status::Warning, format!("{} check(s) could not complete", failed))
        } else {
            (Status::Success, "Referential integrity is intact".to_string())
        };

        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            status,
            message,
            total_violations,
            violation_summary,
            checks,
            log,
        }
    }

    /// Anomalies found by one check (empty if the check did not run)
    pub fn anomalies(&self, check: CheckKind) -> &[AnomalyRecord] {
        self.checks
            .get(&check)
            .map(|o| o.anomalies.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_violations(&self) -> bool {
        self.total_violations > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Orphan and NULL counts for one foreign key column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkViolationCounts {
    pub orphaned_records: i64,
    pub null_values: i64,
    pub total_violations: i64,
}

impl FkViolationCounts {
    pub fn new(orphaned_records: i64, null_values: i64) -> Self {
        Self {
            orphaned_records,
            null_values,
            total_violations: orphaned_records + null_values,
        }
    }
}

/// Targeted child/parent integrity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkViolationReport {
    pub child_table: String,
    pub parent_table: String,

    /// Keyed by child column
    pub columns: BTreeMap<String, FkViolationCounts>,
}

impl FkViolationReport {
    pub fn total_violations(&self) -> i64 {
        self.columns.values().map(|c| c.total_violations).sum()
    }
}

/// A foreign key suggested by naming convention
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PotentialForeignKey {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
}

/// Declared vs suggested foreign keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipReport {
    pub existing: Vec<ForeignKeyMeta>,
    pub potential: Vec<PotentialForeignKey>,
    pub missing: Vec<PotentialForeignKey>,
    pub num_existing: usize,
    pub num_potential: usize,
    pub num_missing: usize,

    /// `potential - existing`; negative when more keys are declared than suggested
    pub num_anomalies: i64,
}

/// Declared referential actions of one foreign key column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub on_insert: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub on_delete: Option<ReferentialAction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyKind;

    #[test]
    fn clean_scan_is_success() {
        let mut checks = BTreeMap::new();
        checks.insert(CheckKind::IsolatedTables, CheckOutcome::completed(CheckKind::IsolatedTables, vec![]));
        let report = ScanReport::from_outcomes(checks, vec![]);

        assert_eq!(report.status, Status::Success);
        assert_eq!(report.total_violations, 0);
        assert!(report.violation_summary.is_empty());
    }

    #[test]
    fn violations_are_counted_and_explained() {
        let mut checks = BTreeMap::new();
        checks.insert(
            CheckKind::IsolatedTables,
            CheckOutcome::completed(
                CheckKind::IsolatedTables,
                vec![
                    AnomalyRecord::new(AnomalyKind::IsolatedTable, "a", "x"),
                    AnomalyRecord::new(AnomalyKind::IsolatedTable, "b", "x"),
                ],
            ),
        );
        checks.insert(
            CheckKind::OrphanRecords,
            CheckOutcome::failed(&AuditError::CatalogUnavailable("connection reset".into())),
        );
        let report = ScanReport::from_outcomes(checks, vec![]);

        assert_eq!(report.status, Status::Warning);
        assert_eq!(report.total_violations, 2);
        assert_eq!(report.violation_summary.len(), 1);
        assert_eq!(report.anomalies(CheckKind::IsolatedTables).len(), 2);
        assert!(report.checks[&CheckKind::OrphanRecords].is_failed());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"isolated_tables\""));
        assert!(json.contains("connection reset"));
    }

    #[test]
    fn failed_checks_alone_downgrade_status() {
        let mut checks = BTreeMap::new();
        checks.insert(
            CheckKind::TypeMismatches,
            CheckOutcome::failed(&AuditError::CatalogUnavailable("timeout".into())),
        );
        let report = ScanReport::from_outcomes(checks, vec![]);
        assert_eq!(report.status, Status::Warning);
        assert_eq!(report.message, "1 check(s) could not complete");
    }

    #[test]
    fn fk_counts_total() {
        let counts = FkViolationCounts::new(1, 1);
        assert_eq!(counts.total_violations, 2);
    }

    #[test]
    fn failure_result_carries_kind_and_statement() {
        let err = AuditError::ExecutionFailure {
            message: "boom".into(),
            statement: "DELETE FROM t WHERE x = 1".into(),
        };
        let result = MutationAuditResult::failure(&err).with_target(Operation::Delete, "t");
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error_kind, Some(ErrorKind::ExecutionFailure));
        assert_eq!(result.attempted_statement.as_deref(), Some("DELETE FROM t WHERE x = 1"));

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("\"operation\":\"DELETE\""));
    }
}
