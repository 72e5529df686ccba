//! refaudit core
//!
//! Domain model shared by every crate in the workspace.
//! Anomaly codes and error codes are stable strings - never rename them,
//! they are part of the report format.

pub mod catalog;
pub mod mutation;
pub mod anomaly;
pub mod check;
pub mod audit_log;
pub mod error;
pub mod report;
pub mod scan_log;
pub mod config;

pub use catalog::{ColumnMeta, ForeignKeyMeta, IndexMeta, ReferentialAction, TableShape};
pub use mutation::{Assignment, ClassifiedMutation, ExecutableStatement, Operation, ResolvedValues, SqlLiteral};
pub use anomaly::{AnomalyKind, AnomalyRecord};
pub use check::CheckKind;
pub use audit_log::{AuditLogEntry, AuditLogFilter, AuditTrigger, DEFAULT_AUDIT_LOG_TABLE};
pub use error::{AuditError, ErrorKind};
pub use report::{
    ActionSummary, CheckOutcome, FkViolationCounts, FkViolationReport, MutationAuditResult,
    PotentialForeignKey, RelationshipReport, ReportVersion, ScanReport, Status,
};
pub use scan_log::{LogLevel, LogLine, ScanLog};
pub use config::{AuditSettings, Config, ConfigError, ConnectionConfig, ExecutionMode, ScanConfig, TimeoutConfig};
