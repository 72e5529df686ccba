//! In-memory database for testing
//!
//! Holds tables (columns, primary key, indexes, rows), foreign keys,
//! triggers and audit logs without connecting anywhere. Orphan and null
//! counts are computed from the stored rows, and executing a statement on a
//! table with a matching audit trigger appends an audit row, so the engine's
//! full pipeline can run against it.
//!
//! Statements are not interpreted: an executed insert does not add a row.
//!
//! ## Simulating Failures
//!
//! ```rust,ignore
//! // Every call fails as if the server were unreachable
//! let db = MockDatabase::new().with_connection_failure();
//!
//! // One operation fails, everything else works
//! let db = MockDatabase::new().with_failing_operation("count_orphans");
//!
//! // Add delay to every call
//! let db = MockDatabase::new().with_latency(100);
//! ```

use crate::adapter::{CatalogError, CatalogReader, TargetDatabase};
use chrono::Utc;
use refaudit_core::{
    AuditLogEntry, AuditLogFilter, AuditTrigger, ColumnMeta, ExecutableStatement, ForeignKeyMeta,
    IndexMeta,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One row: column name to value (`Value::Null` or absent is NULL)
pub type MockRow = BTreeMap<String, Value>;

/// A table held by [`MockDatabase`]
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    pub columns: Vec<ColumnMeta>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexMeta>,
    pub rows: Vec<MockRow>,
}

#[derive(Debug, Default)]
struct MockState {
    tables: BTreeMap<String, MockTable>,
    foreign_keys: Vec<ForeignKeyMeta>,

    /// Audit triggers by table, keyed by trigger name
    triggers: BTreeMap<String, BTreeMap<String, AuditTrigger>>,

    /// Audit log tables and their rows
    audit_logs: BTreeMap<String, Vec<AuditLogEntry>>,

    executed: Vec<ExecutableStatement>,
    next_audit_id: i64,
}

impl MockState {
    fn table_key(&self, name: &str) -> Option<String> {
        if self.tables.contains_key(name) {
            return Some(name.to_string());
        }
        self.tables.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
    }

    fn table(&self, name: &str) -> Result<&MockTable, CatalogError> {
        self.table_key(name)
            .and_then(|key| self.tables.get(&key))
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    fn log_key(&self, name: &str) -> Option<String> {
        self.audit_logs.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
    }

    /// Register an empty audit log, replacing any existing one
    fn reset_audit_log(&mut self, log_table: &str) {
        if let Some(key) = self.log_key(log_table) {
            self.audit_logs.remove(&key);
            self.tables.remove(&key);
        }
        self.audit_logs.insert(log_table.to_string(), Vec::new());
        self.tables.insert(log_table.to_string(), audit_log_table(log_table));
    }
}

/// Column layout the audit log has in the database
fn audit_log_table(log_table: &str) -> MockTable {
    MockTable {
        columns: vec![
            ColumnMeta::new(log_table, "id", "bigint").not_null(),
            ColumnMeta::new(log_table, "table_name", "text").not_null(),
            ColumnMeta::new(log_table, "operation", "text").not_null(),
            ColumnMeta::new(log_table, "db_user", "text").not_null(),
            ColumnMeta::new(log_table, "logged_at", "timestamp with time zone").not_null(),
            ColumnMeta::new(log_table, "payload", "text"),
        ],
        primary_key: vec!["id".to_string()],
        indexes: vec![IndexMeta::new(log_table, format!("{}_pkey", log_table), vec!["id".to_string()]).primary()],
        rows: Vec::new(),
    }
}

/// In-memory [`TargetDatabase`]
///
/// Clones share state, so a test can keep a handle while the engine owns another.
pub struct MockDatabase {
    state: Arc<RwLock<MockState>>,

    /// Operation names (trait method names) that fail with `QueryError`
    failing_operations: HashSet<String>,

    /// Trigger names whose creation fails
    failing_triggers: HashSet<String>,

    /// Error message returned by `execute`
    execution_error: Option<String>,

    fail_connection: bool,
    latency_ms: u64,
    name: &'static str,
}

impl MockDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState {
                next_audit_id: 1,
                ..MockState::default()
            })),
            failing_operations: HashSet::new(),
            failing_triggers: HashSet::new(),
            execution_error: None,
            fail_connection: false,
            latency_ms: 0,
            name: "Mock",
        }
    }

    /// Add or replace a table
    pub async fn add_table(&self, name: impl Into<String>, table: MockTable) {
        self.state.write().await.tables.insert(name.into(), table);
    }

    /// Declare a foreign key
    pub async fn add_foreign_key(&self, fk: ForeignKeyMeta) {
        self.state.write().await.foreign_keys.push(fk);
    }

    /// Append a row to an existing table
    pub async fn insert_row(&self, table: &str, row: MockRow) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let key = state
            .table_key(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.to_string()))?;
        if let Some(t) = state.tables.get_mut(&key) {
            t.rows.push(row);
        }
        Ok(())
    }

    /// Audit rows written so far, oldest first
    pub async fn audit_entries(&self, log_table: &str) -> Vec<AuditLogEntry> {
        let state = self.state.read().await;
        state
            .log_key(log_table)
            .and_then(|key| state.audit_logs.get(&key).cloned())
            .unwrap_or_default()
    }

    /// Whether the audit log table exists
    pub async fn has_audit_log(&self, log_table: &str) -> bool {
        self.state.read().await.log_key(log_table).is_some()
    }

    /// Statements passed to `execute`, in order
    pub async fn executed(&self) -> Vec<ExecutableStatement> {
        self.state.read().await.executed.clone()
    }

    /// Fail every call as if the server were unreachable
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Fail one operation (by trait method name, e.g. `"indexes"`)
    pub fn with_failing_operation(mut self, operation: impl Into<String>) -> Self {
        self.failing_operations.insert(operation.into());
        self
    }

    /// Fail creation of one trigger (e.g. `"tr_orders_update"`)
    pub fn with_failing_trigger(mut self, name: impl Into<String>) -> Self {
        self.failing_triggers.insert(name.into());
        self
    }

    /// Reject every executed statement with `message`
    pub fn with_execution_error(mut self, message: impl Into<String>) -> Self {
        self.execution_error = Some(message.into());
        self
    }

    /// Delay every call by `latency_ms`
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Backend name reported by `name()`
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Latency, connection failure and per-operation failure, in that order
    async fn enter(&self, operation: &str) -> Result<(), CatalogError> {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
        if self.fail_connection {
            return Err(CatalogError::ConnectionError("Simulated connection failure".to_string()));
        }
        if self.failing_operations.contains(operation) {
            return Err(CatalogError::QueryError(format!("Simulated failure in {}", operation)));
        }
        Ok(())
    }
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockDatabase {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            failing_operations: self.failing_operations.clone(),
            failing_triggers: self.failing_triggers.clone(),
            execution_error: self.execution_error.clone(),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            name: self.name,
        }
    }
}

fn is_null(row: &MockRow, column: &str) -> bool {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(column))
        .map(|(_, v)| v.is_null())
        .unwrap_or(true)
}

fn require_column(table: &MockTable, table_name: &str, column: &str) -> Result<(), CatalogError> {
    if table.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)) {
        Ok(())
    } else {
        Err(CatalogError::ColumnNotFound(format!("{}.{}", table_name, column)))
    }
}

fn cell<'a>(row: &'a MockRow, column: &str) -> Option<&'a Value> {
    row.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(column))
        .map(|(_, v)| v)
        .filter(|v| !v.is_null())
}

#[async_trait::async_trait]
impl CatalogReader for MockDatabase {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn list_tables(&self) -> Result<Vec<String>, CatalogError> {
        self.enter("list_tables").await?;
        Ok(self.state.read().await.tables.keys().cloned().collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>, CatalogError> {
        self.enter("columns").await?;
        Ok(self.state.read().await.table(table)?.columns.clone())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>, CatalogError> {
        self.enter("primary_key").await?;
        Ok(self.state.read().await.table(table)?.primary_key.clone())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>, CatalogError> {
        self.enter("foreign_keys").await?;
        let state = self.state.read().await;
        state.table(table)?;
        Ok(state
            .foreign_keys
            .iter()
            .filter(|fk| fk.child_table.eq_ignore_ascii_case(table))
            .cloned()
            .collect())
    }

    async fn all_foreign_keys(&self) -> Result<Vec<ForeignKeyMeta>, CatalogError> {
        self.enter("all_foreign_keys").await?;
        Ok(self.state.read().await.foreign_keys.clone())
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>, CatalogError> {
        self.enter("indexes").await?;
        Ok(self.state.read().await.table(table)?.indexes.clone())
    }

    async fn test_connection(&self) -> Result<(), CatalogError> {
        self.enter("test_connection").await
    }
}

#[async_trait::async_trait]
impl TargetDatabase for MockDatabase {
    async fn max_integer(&self, table: &str, column: &str) -> Result<Option<i64>, CatalogError> {
        self.enter("max_integer").await?;
        let state = self.state.read().await;
        Ok(state
            .table(table)?
            .rows
            .iter()
            .filter_map(|row| cell(row, column).and_then(Value::as_i64))
            .max())
    }

    async fn execute(&self, statement: &ExecutableStatement) -> Result<u64, CatalogError> {
        self.enter("execute").await?;
        if let Some(message) = &self.execution_error {
            return Err(CatalogError::ExecutionError(message.clone()));
        }

        let mut state = self.state.write().await;
        state.table(&statement.table)?;
        state.executed.push(statement.clone());

        let trigger = state
            .table_key(&statement.table)
            .and_then(|key| state.triggers.get(&key))
            .and_then(|by_name| by_name.values().find(|t| t.operation == statement.operation))
            .cloned();

        if let Some(trigger) = trigger {
            if let Some(log_key) = state.log_key(&trigger.log_table) {
                let id = state.next_audit_id;
                state.next_audit_id += 1;

                let payload = if statement.is_bound() {
                    Value::Array(
                        statement
                            .params
                            .iter()
                            .map(|p| p.clone().map(Value::String).unwrap_or(Value::Null))
                            .collect(),
                    )
                } else {
                    Value::String(statement.sql.clone())
                };

                let entry = AuditLogEntry {
                    id,
                    table: trigger.table.clone(),
                    operation: statement.operation.as_str().to_string(),
                    user: "mock".to_string(),
                    timestamp: Utc::now(),
                    payload,
                };
                if let Some(log) = state.audit_logs.get_mut(&log_key) {
                    log.push(entry);
                }
            }
        }

        Ok(1)
    }

    async fn count_orphans(&self, fk: &ForeignKeyMeta) -> Result<i64, CatalogError> {
        self.enter("count_orphans").await?;
        let state = self.state.read().await;
        let child = state.table(&fk.child_table)?;
        let parent = state.table(&fk.parent_table)?;
        require_column(child, &fk.child_table, &fk.child_column)?;
        require_column(parent, &fk.parent_table, &fk.parent_column)?;

        let parent_keys: Vec<&Value> = parent
            .rows
            .iter()
            .filter_map(|row| cell(row, &fk.parent_column))
            .collect();

        let orphans = child
            .rows
            .iter()
            .filter_map(|row| cell(row, &fk.child_column))
            .filter(|value| !parent_keys.contains(value))
            .count();
        Ok(orphans as i64)
    }

    async fn count_nulls(&self, fk: &ForeignKeyMeta) -> Result<i64, CatalogError> {
        self.enter("count_nulls").await?;
        let state = self.state.read().await;
        let child = state.table(&fk.child_table)?;
        require_column(child, &fk.child_table, &fk.child_column)?;
        Ok(child.rows.iter().filter(|row| is_null(row, &fk.child_column)).count() as i64)
    }

    async fn ensure_audit_log(&self, log_table: &str) -> Result<(), CatalogError> {
        self.enter("ensure_audit_log").await?;
        let mut state = self.state.write().await;
        if state.log_key(log_table).is_none() {
            state.reset_audit_log(log_table);
        }
        Ok(())
    }

    async fn recreate_audit_log(&self, log_table: &str) -> Result<(), CatalogError> {
        self.enter("recreate_audit_log").await?;
        self.state.write().await.reset_audit_log(log_table);
        Ok(())
    }

    async fn list_triggers(&self, table: &str) -> Result<Vec<String>, CatalogError> {
        self.enter("list_triggers").await?;
        let state = self.state.read().await;
        let key = state
            .table_key(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.to_string()))?;
        Ok(state
            .triggers
            .get(&key)
            .map(|by_name| by_name.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn drop_trigger(&self, table: &str, name: &str) -> Result<(), CatalogError> {
        self.enter("drop_trigger").await?;
        let mut state = self.state.write().await;
        let key = state
            .table_key(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.to_string()))?;
        state
            .triggers
            .get_mut(&key)
            .and_then(|by_name| by_name.remove(name))
            .map(|_| ())
            .ok_or_else(|| CatalogError::TriggerNotFound(name.to_string()))
    }

    async fn create_audit_trigger(&self, trigger: &AuditTrigger) -> Result<(), CatalogError> {
        self.enter("create_audit_trigger").await?;
        let name = trigger.name();
        if self.failing_triggers.contains(&name) {
            return Err(CatalogError::QueryError(format!("Simulated failure creating {}", name)));
        }

        let mut state = self.state.write().await;
        let key = state
            .table_key(&trigger.table)
            .ok_or_else(|| CatalogError::TableNotFound(trigger.table.clone()))?;
        let by_name = state.triggers.entry(key).or_default();
        if by_name.contains_key(&name) {
            return Err(CatalogError::TriggerExists(name));
        }
        by_name.insert(name, trigger.clone());
        Ok(())
    }

    async fn fetch_audit_entries(
        &self,
        log_table: &str,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLogEntry>, CatalogError> {
        self.enter("fetch_audit_entries").await?;
        let state = self.state.read().await;
        let key = state
            .log_key(log_table)
            .ok_or_else(|| CatalogError::TableNotFound(log_table.to_string()))?;

        let mut entries: Vec<AuditLogEntry> = state.audit_logs[&key]
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            entries.truncate(limit.max(0) as usize);
        }
        Ok(entries)
    }
}

/// Builder for a [`MockDatabase`] with tables, keys and rows
///
/// # Example
///
/// ```rust,ignore
/// let db = MockDatabaseBuilder::new()
///     .with_table("customers", vec![ColumnMeta::new("customers", "id", "integer")], vec!["id"])
///     .with_rows("customers", vec![row(&[("id", json!(1))])])
///     .build();
/// ```
pub struct MockDatabaseBuilder {
    state: MockState,
    db: MockDatabase,
}

impl MockDatabaseBuilder {
    pub fn new() -> Self {
        Self {
            state: MockState {
                next_audit_id: 1,
                ..MockState::default()
            },
            db: MockDatabase::new(),
        }
    }

    /// Add a table with its columns and primary key
    pub fn with_table(mut self, name: &str, columns: Vec<ColumnMeta>, primary_key: Vec<&str>) -> Self {
        self.state.tables.insert(
            name.to_string(),
            MockTable {
                columns,
                primary_key: primary_key.into_iter().map(String::from).collect(),
                ..MockTable::default()
            },
        );
        self
    }

    /// Add an index to a previously added table
    pub fn with_index(mut self, index: IndexMeta) -> Self {
        if let Some(table) = self.state.tables.get_mut(&index.table) {
            table.indexes.push(index);
        }
        self
    }

    /// Append rows to a previously added table
    pub fn with_rows(mut self, table: &str, rows: Vec<MockRow>) -> Self {
        if let Some(t) = self.state.tables.get_mut(table) {
            t.rows.extend(rows);
        }
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKeyMeta) -> Self {
        self.state.foreign_keys.push(fk);
        self
    }

    /// Start with an (empty) audit log table
    pub fn with_audit_log(mut self, log_table: &str) -> Self {
        self.state.reset_audit_log(log_table);
        self
    }

    pub fn with_failing_operation(mut self, operation: &str) -> Self {
        self.db = self.db.with_failing_operation(operation);
        self
    }

    pub fn with_failing_trigger(mut self, name: &str) -> Self {
        self.db = self.db.with_failing_trigger(name);
        self
    }

    pub fn with_execution_error(mut self, message: &str) -> Self {
        self.db = self.db.with_execution_error(message);
        self
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.db = self.db.with_connection_failure();
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.db = self.db.with_latency(latency_ms);
        self
    }

    pub fn build(self) -> MockDatabase {
        MockDatabase {
            state: Arc::new(RwLock::new(self.state)),
            ..self.db
        }
    }
}

impl Default for MockDatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a row from `(column, value)` pairs
pub fn row(cells: &[(&str, Value)]) -> MockRow {
    cells.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use refaudit_core::Operation;
    use serde_json::json;

    fn shop() -> MockDatabase {
        MockDatabaseBuilder::new()
            .with_table("customers", vec![ColumnMeta::new("customers", "id", "integer").not_null()], vec!["id"])
            .with_table(
                "orders",
                vec![
                    ColumnMeta::new("orders", "id", "integer").not_null(),
                    ColumnMeta::new("orders", "customer_id", "integer"),
                ],
                vec!["id"],
            )
            .with_rows("customers", vec![row(&[("id", json!(1))])])
            .with_rows(
                "orders",
                vec![
                    row(&[("id", json!(10)), ("customer_id", json!(1))]),
                    row(&[("id", json!(11)), ("customer_id", json!(2))]),
                    row(&[("id", json!(12)), ("customer_id", Value::Null)]),
                ],
            )
            .with_foreign_key(ForeignKeyMeta::new("fk_orders_customer", "orders", "customer_id", "customers", "id"))
            .build()
    }

    #[tokio::test]
    async fn tables_are_listed_in_order() {
        let db = shop();
        assert_eq!(db.list_tables().await.unwrap(), vec!["customers", "orders"]);
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let db = shop();
        assert!(matches!(db.columns("invoices").await, Err(CatalogError::TableNotFound(_))));
    }

    #[tokio::test]
    async fn lookups_ignore_case() {
        let db = shop();
        let shape = db.table_shape("ORDERS").await.unwrap();
        assert_eq!(shape.table, "orders");
        assert_eq!(shape.primary_key, vec!["id"]);
    }

    #[tokio::test]
    async fn orphan_and_null_counts() {
        let db = shop();
        let fk = &db.all_foreign_keys().await.unwrap()[0];
        assert_eq!(db.count_orphans(fk).await.unwrap(), 1);
        assert_eq!(db.count_nulls(fk).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn counting_a_missing_key_column_is_not_found() {
        let db = shop();
        let fk = ForeignKeyMeta::new("fk_orders_code", "orders", "customer_id", "customers", "code");
        assert_eq!(
            db.count_orphans(&fk).await,
            Err(CatalogError::ColumnNotFound("customers.code".into()))
        );
    }

    #[tokio::test]
    async fn max_integer_ignores_nulls() {
        let db = shop();
        assert_eq!(db.max_integer("orders", "id").await.unwrap(), Some(12));
        assert_eq!(db.max_integer("orders", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_trigger_is_rejected() {
        let db = shop();
        let trigger = AuditTrigger::new("orders", Operation::Insert, "audit_log");

        db.create_audit_trigger(&trigger).await.unwrap();
        assert!(matches!(
            db.create_audit_trigger(&trigger).await,
            Err(CatalogError::TriggerExists(_))
        ));

        db.drop_trigger("orders", "tr_orders_insert").await.unwrap();
        assert!(matches!(
            db.drop_trigger("orders", "tr_orders_insert").await,
            Err(CatalogError::TriggerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn execution_writes_audit_row_when_triggered() {
        let db = shop();
        db.ensure_audit_log("audit_log").await.unwrap();
        db.create_audit_trigger(&AuditTrigger::new("orders", Operation::Delete, "audit_log"))
            .await
            .unwrap();

        let delete = ExecutableStatement::literal("orders", Operation::Delete, "DELETE FROM orders WHERE id = 12");
        db.execute(&delete).await.unwrap();

        let insert = ExecutableStatement::literal("orders", Operation::Insert, "INSERT INTO orders (id) VALUES (13)");
        db.execute(&insert).await.unwrap();

        let entries = db.audit_entries("audit_log").await;
        assert_eq!(entries.len(), 1);
        assert!(db.list_tables().await.unwrap().contains(&"audit_log".to_string()));
        assert_eq!(entries[0].operation, "DELETE");
        assert_eq!(db.executed().await.len(), 2);
    }

    #[tokio::test]
    async fn connection_failure_applies_everywhere() {
        let db = MockDatabase::new().with_connection_failure();
        assert!(matches!(db.test_connection().await, Err(CatalogError::ConnectionError(_))));
        assert!(matches!(db.list_tables().await, Err(CatalogError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn single_operation_failure() {
        let db = shop().with_failing_operation("indexes");
        assert!(db.indexes("orders").await.is_err());
        assert!(db.columns("orders").await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let db = MockDatabase::new();
        let handle = db.clone();
        db.add_table("widgets", MockTable::default()).await;
        assert_eq!(handle.list_tables().await.unwrap(), vec!["widgets"]);
    }
}
