//! Audit log administration and reads

use crate::timeout::catalog_call;
use refaudit_catalog::TargetDatabase;
use refaudit_core::{AuditError, AuditLogEntry, AuditLogFilter, Operation, TimeoutConfig};
use std::time::Duration;

/// The audit log table of one database
pub struct AuditLog<'a> {
    db: &'a dyn TargetDatabase,
    table: String,
    limit: Duration,
}

impl<'a> AuditLog<'a> {
    pub fn new(db: &'a dyn TargetDatabase, table: impl Into<String>, timeouts: &TimeoutConfig) -> Self {
        Self {
            db,
            table: table.into(),
            limit: timeouts.query_timeout(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table when absent; existing rows are kept
    pub async fn ensure(&self) -> Result<(), AuditError> {
        catalog_call(self.limit, "ensure_audit_log", self.db.ensure_audit_log(&self.table)).await
    }

    /// Drop and recreate the table, discarding every row
    pub async fn recreate(&self) -> Result<(), AuditError> {
        tracing::warn!(table = %self.table, "recreating audit log; existing entries are discarded");
        catalog_call(self.limit, "recreate_audit_log", self.db.recreate_audit_log(&self.table)).await
    }

    /// Most recent entry for `table` and `operation`
    pub async fn latest(&self, table: &str, operation: Operation) -> Result<Option<AuditLogEntry>, AuditError> {
        let filter = AuditLogFilter::new().table(table).operation(operation).limit(1);
        Ok(self.list(&filter).await?.into_iter().next())
    }

    /// Entries matching `filter`, newest first
    pub async fn list(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>, AuditError> {
        let entries = catalog_call(
            self.limit,
            "fetch_audit_entries",
            self.db.fetch_audit_entries(&self.table, filter),
        )
        .await?;
        tracing::debug!(table = %self.table, count = entries.len(), "read audit log entries");
        Ok(entries)
    }
}
