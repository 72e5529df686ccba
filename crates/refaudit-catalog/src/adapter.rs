//! Database traits for catalog introspection and audited execution

use refaudit_core::{
    AuditError, AuditLogEntry, AuditLogFilter, AuditTrigger, ColumnMeta, ExecutableStatement,
    ForeignKeyMeta, IndexMeta, TableShape,
};

/// Errors that can occur when talking to the target database
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    #[error("Trigger already exists: {0}")]
    TriggerExists(String),

    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Statement rejected: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CatalogError {
    /// The requested object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound(_) | Self::ColumnNotFound(_) | Self::TriggerNotFound(_))
    }
}

impl From<CatalogError> for AuditError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::TableNotFound(table) => AuditError::NotFound(format!("table {}", table)),
            CatalogError::ColumnNotFound(column) => AuditError::NotFound(format!("column {}", column)),
            CatalogError::TriggerNotFound(name) => AuditError::NotFound(format!("trigger {}", name)),
            CatalogError::ExecutionError(message) => AuditError::ExecutionFailure {
                message,
                statement: String::new(),
            },
            CatalogError::ConfigError(message) => AuditError::InvalidConfig(message),
            other => AuditError::CatalogUnavailable(other.to_string()),
        }
    }
}

/// Read-only view of the live catalog
///
/// Every call goes to the database; nothing is cached between calls.
#[async_trait::async_trait]
pub trait CatalogReader: Send + Sync {
    /// Backend name (e.g., "PostgreSQL")
    fn name(&self) -> &'static str;

    /// Base tables, ordered by name
    async fn list_tables(&self) -> Result<Vec<String>, CatalogError>;

    /// Columns in ordinal order; `TableNotFound` when the table does not exist
    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>, CatalogError>;

    /// Primary key columns in key order; empty when the table has none
    async fn primary_key(&self, table: &str) -> Result<Vec<String>, CatalogError>;

    /// Foreign keys declared on `table` (as the referencing side)
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>, CatalogError>;

    /// Every foreign key in the schema
    async fn all_foreign_keys(&self) -> Result<Vec<ForeignKeyMeta>, CatalogError>;

    /// Indexes on `table`
    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>, CatalogError>;

    /// Cheap round-trip to validate credentials
    async fn test_connection(&self) -> Result<(), CatalogError>;

    /// Columns and primary key of one table
    async fn table_shape(&self, table: &str) -> Result<TableShape, CatalogError> {
        let columns = self.columns(table).await?;
        let primary_key = self.primary_key(table).await?;
        // Report the catalog's spelling of the name
        let name = columns
            .first()
            .map(|c| c.table.clone())
            .unwrap_or_else(|| table.to_string());
        Ok(TableShape::new(name, columns, primary_key))
    }
}

/// Data-side operations on the audited database
#[async_trait::async_trait]
pub trait TargetDatabase: CatalogReader {
    /// `max(column)` over the table; `None` when the table is empty
    async fn max_integer(&self, table: &str, column: &str) -> Result<Option<i64>, CatalogError>;

    /// Run one statement, returning the affected row count
    async fn execute(&self, statement: &ExecutableStatement) -> Result<u64, CatalogError>;

    /// Child rows whose non-null key matches no parent row
    async fn count_orphans(&self, fk: &ForeignKeyMeta) -> Result<i64, CatalogError>;

    /// Child rows whose key column is NULL
    async fn count_nulls(&self, fk: &ForeignKeyMeta) -> Result<i64, CatalogError>;

    /// Create the audit log table when absent
    async fn ensure_audit_log(&self, log_table: &str) -> Result<(), CatalogError>;

    /// Drop and recreate the audit log table, discarding its rows
    async fn recreate_audit_log(&self, log_table: &str) -> Result<(), CatalogError>;

    /// Trigger names defined on `table`
    async fn list_triggers(&self, table: &str) -> Result<Vec<String>, CatalogError>;

    /// Drop a trigger; `TriggerNotFound` when it does not exist
    async fn drop_trigger(&self, table: &str, name: &str) -> Result<(), CatalogError>;

    /// Create a change-capture trigger; `TriggerExists` when the name is taken
    async fn create_audit_trigger(&self, trigger: &AuditTrigger) -> Result<(), CatalogError>;

    /// Audit rows matching `filter`, newest first
    async fn fetch_audit_entries(
        &self,
        log_table: &str,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLogEntry>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use refaudit_core::ErrorKind;

    #[test]
    fn catalog_errors_map_to_taxonomy() {
        let cases = [
            (CatalogError::TableNotFound("orders".into()), ErrorKind::NotFound),
            (CatalogError::ColumnNotFound("orders.colour".into()), ErrorKind::NotFound),
            (CatalogError::ConnectionError("refused".into()), ErrorKind::CatalogUnavailable),
            (CatalogError::PermissionDenied("pg_class".into()), ErrorKind::CatalogUnavailable),
            (CatalogError::ExecutionError("duplicate key".into()), ErrorKind::ExecutionFailure),
            (CatalogError::ConfigError("bad tls".into()), ErrorKind::InvalidConfig),
        ];

        for (err, kind) in cases {
            assert_eq!(AuditError::from(err).kind(), kind);
        }
    }

    #[test]
    fn not_found_detection() {
        assert!(CatalogError::TriggerNotFound("tr_orders_insert".into()).is_not_found());
        assert!(!CatalogError::QueryError("syntax".into()).is_not_found());
    }
}
