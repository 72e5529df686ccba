//! refaudit engine
//!
//! Runs against any [`TargetDatabase`](refaudit_catalog::TargetDatabase):
//! - [`MutationAuditor`]: classify, reconcile and execute a mutation with audit capture
//! - [`TriggerProvisioner`]: install the per-table audit triggers
//! - [`Scanner`]: referential integrity anomaly checks
//! - [`AuditLog`]: audit log administration and reads
//!
//! Nothing here keeps state between requests.

pub mod analyzers;
pub mod audit_log;
pub mod auditor;
pub mod scanner;
pub mod snapshot;
pub mod triggers;
mod timeout;

pub use audit_log::AuditLog;
pub use auditor::MutationAuditor;
pub use scanner::Scanner;
pub use snapshot::{Needs, SchemaSnapshot};
pub use triggers::{TriggerProvisioner, TriggerProvisioning};
