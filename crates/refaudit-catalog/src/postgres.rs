//! PostgreSQL backend
//!
//! Catalog lookups read `information_schema` and `pg_catalog` with bound
//! parameters. Identifiers that have to be interpolated (table and column
//! names in data queries and DDL) are double-quoted.
//!
//! Change capture uses statement-level triggers with transition tables. All
//! audit triggers in a schema share one plpgsql function, which receives the
//! log table's schema and name as trigger arguments:
//!
//! - insert: JSON array of the inserted rows
//! - delete: JSON array of the deleted rows
//! - update: `<old rows> -> <new rows>`
//!
//! Statements that touch no rows write no audit row.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let catalog = PostgresCatalog::connect(&config.connection).await?;
//! let tables = catalog.list_tables().await?;
//! ```

use crate::adapter::{CatalogError, CatalogReader, TargetDatabase};
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use refaudit_core::{
    AuditLogEntry, AuditLogFilter, AuditTrigger, ColumnMeta, ConnectionConfig, ExecutableStatement,
    ForeignKeyMeta, IndexMeta, Operation, ReferentialAction, TableShape,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls};

/// Name of the shared change-capture function
const CAPTURE_FUNCTION: &str = "refaudit_capture";

/// PostgreSQL catalog and execution backend
pub struct PostgresCatalog {
    client: Client,

    /// Schema every lookup and statement is scoped to
    schema: String,

    host: String,
    port: u16,
    database: String,
}

impl PostgresCatalog {
    /// Connect using validated connection parameters
    ///
    /// Plain or TLS depending on `config.tls`. The session's `search_path` is
    /// set to `config.schema` so raw update/delete statements resolve there.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, CatalogError> {
        config
            .validate()
            .map_err(|e| CatalogError::ConfigError(e.to_string()))?;

        let pg_config: PgConfig = config
            .to_connection_string()
            .parse()
            .map_err(|e| CatalogError::ConfigError(format!("Invalid connection parameters: {}", e)))?;

        let client = if config.tls {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| CatalogError::ConfigError(format!("Failed to create TLS connector: {}", e)))?;
            let (client, connection) = pg_config
                .connect(MakeTlsConnector::new(connector))
                .await
                .map_err(|e| connect_error(&config.host, config.port, e))?;
            spawn_connection(config.host.clone(), config.port, connection);
            client
        } else {
            let (client, connection) = pg_config
                .connect(NoTls)
                .await
                .map_err(|e| connect_error(&config.host, config.port, e))?;
            spawn_connection(config.host.clone(), config.port, connection);
            client
        };

        client
            .batch_execute(&format!("SET search_path TO {}", quote_ident(&config.schema)))
            .await
            .map_err(query_error)?;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            schema = %config.schema,
            tls = config.tls,
            "connected to PostgreSQL"
        );

        Ok(Self {
            client,
            schema: config.schema.clone(),
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// `"schema"."name"`
    fn qualified(&self, name: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(name))
    }

    /// Catalog spelling of `table`: exact match first, then the folded form
    async fn resolve_table(&self, table: &str) -> Result<String, CatalogError> {
        tracing::debug!(table, "resolving table name");
        let row = self
            .client
            .query_opt(
                r#"
                SELECT table_name::text
                FROM information_schema.tables
                WHERE table_schema::text = $1::text
                  AND table_name::text IN ($2::text, lower($2::text))
                ORDER BY (table_name::text = $2::text) DESC
                LIMIT 1
                "#,
                &[&self.schema, &table],
            )
            .await
            .map_err(query_error)?;

        row.map(|r| r.get(0))
            .ok_or_else(|| CatalogError::TableNotFound(table.to_string()))
    }

    async fn fetch_columns(&self, table: &str) -> Result<Vec<ColumnMeta>, CatalogError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    table_name::text,
                    column_name::text,
                    data_type::text,
                    udt_name::text,
                    character_maximum_length::int,
                    is_nullable::text
                FROM information_schema.columns
                WHERE table_schema::text = $1::text
                  AND table_name::text = $2::text
                ORDER BY ordinal_position
                "#,
                &[&self.schema, &table],
            )
            .await
            .map_err(query_error)?;

        let columns: Vec<ColumnMeta> = rows
            .iter()
            .map(|row| {
                let data_type: String = row.get(2);
                let udt_name: String = row.get(3);
                let is_nullable: String = row.get(5);

                ColumnMeta {
                    table: row.get(0),
                    name: row.get(1),
                    declared_type: declared_type(&data_type, &udt_name),
                    max_length: row.get(4),
                    nullable: is_nullable.eq_ignore_ascii_case("YES"),
                }
            })
            .collect();

        if columns.is_empty() {
            return Err(CatalogError::TableNotFound(table.to_string()));
        }
        Ok(columns)
    }

    async fn fetch_primary_key(&self, table: &str) -> Result<Vec<String>, CatalogError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT kcu.column_name::text
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                  ON kcu.constraint_name = tc.constraint_name
                 AND kcu.table_schema = tc.table_schema
                 AND kcu.table_name = tc.table_name
                WHERE tc.constraint_type = 'PRIMARY KEY'
                  AND tc.table_schema::text = $1::text
                  AND tc.table_name::text = $2::text
                ORDER BY kcu.ordinal_position
                "#,
                &[&self.schema, &table],
            )
            .await
            .map_err(query_error)?;

        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    /// Foreign keys in the schema, optionally limited to one referencing table
    async fn fetch_foreign_keys(&self, table: Option<&str>) -> Result<Vec<ForeignKeyMeta>, CatalogError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    con.conname::text,
                    child.relname::text,
                    ccol.attname::text,
                    parent.relname::text,
                    pcol.attname::text,
                    con.confupdtype::text,
                    con.confdeltype::text
                FROM pg_constraint con
                JOIN pg_class child ON child.oid = con.conrelid
                JOIN pg_namespace ns ON ns.oid = child.relnamespace
                JOIN pg_class parent ON parent.oid = con.confrelid
                CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(child_attnum, parent_attnum, ord)
                JOIN pg_attribute ccol ON ccol.attrelid = con.conrelid AND ccol.attnum = k.child_attnum
                JOIN pg_attribute pcol ON pcol.attrelid = con.confrelid AND pcol.attnum = k.parent_attnum
                WHERE con.contype = 'f'
                  AND ns.nspname::text = $1::text
                  AND ($2::text IS NULL OR child.relname::text = $2::text)
                ORDER BY child.relname, con.conname, k.ord
                "#,
                &[&self.schema, &table],
            )
            .await
            .map_err(query_error)?;

        Ok(rows
            .iter()
            .map(|row| {
                let on_update: String = row.get(5);
                let on_delete: String = row.get(6);
                ForeignKeyMeta {
                    name: row.get(0),
                    child_table: row.get(1),
                    child_column: row.get(2),
                    parent_table: row.get(3),
                    parent_column: row.get(4),
                    on_insert: None,
                    on_update: action_from_code(&on_update),
                    on_delete: action_from_code(&on_delete),
                }
            })
            .collect())
    }

    async fn fetch_indexes(&self, table: &str) -> Result<Vec<IndexMeta>, CatalogError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT
                    t.relname::text,
                    i.relname::text,
                    ix.indisunique,
                    ix.indisprimary,
                    array_agg(a.attname::text ORDER BY k.ord)
                FROM pg_index ix
                JOIN pg_class t ON t.oid = ix.indrelid
                JOIN pg_class i ON i.oid = ix.indexrelid
                JOIN pg_namespace ns ON ns.oid = t.relnamespace
                CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
                WHERE ns.nspname::text = $1::text
                  AND t.relname::text = $2::text
                GROUP BY t.relname, i.relname, ix.indisunique, ix.indisprimary
                ORDER BY i.relname
                "#,
                &[&self.schema, &table],
            )
            .await
            .map_err(query_error)?;

        Ok(rows
            .iter()
            .map(|row| IndexMeta {
                table: row.get(0),
                name: row.get(1),
                unique: row.get(2),
                primary: row.get(3),
                columns: row.get(4),
            })
            .collect())
    }

    async fn count(&self, sql: &str) -> Result<i64, CatalogError> {
        tracing::debug!(sql, "counting rows");
        let row = self.client.query_one(sql, &[]).await.map_err(query_error)?;
        Ok(row.get(0))
    }

    /// Create or replace the shared capture function in the schema
    async fn install_capture_function(&self) -> Result<(), CatalogError> {
        let ddl = format!(
            r#"
            CREATE OR REPLACE FUNCTION {function}() RETURNS trigger
            LANGUAGE plpgsql AS $capture$
            DECLARE
                image text;
            BEGIN
                IF TG_OP = 'INSERT' THEN
                    SELECT json_agg(n)::text INTO image FROM new_rows n;
                ELSIF TG_OP = 'DELETE' THEN
                    SELECT json_agg(o)::text INTO image FROM old_rows o;
                ELSE
                    SELECT (SELECT json_agg(o)::text FROM old_rows o)
                        || ' -> ' ||
                        (SELECT json_agg(n)::text FROM new_rows n)
                    INTO image;
                END IF;

                IF image IS NULL THEN
                    RETURN NULL;
                END IF;

                EXECUTE format(
                    'INSERT INTO %I.%I (table_name, operation, db_user, payload) VALUES ($1, $2, $3, $4)',
                    TG_ARGV[0], TG_ARGV[1]
                ) USING TG_TABLE_NAME, TG_OP, current_user, image;

                RETURN NULL;
            END;
            $capture$
            "#,
            function = self.qualified(CAPTURE_FUNCTION),
        );

        self.client.batch_execute(&ddl).await.map_err(query_error)
    }

    fn audit_log_ddl(&self, log_table: &str) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                table_name TEXT NOT NULL,
                operation TEXT NOT NULL,
                db_user TEXT NOT NULL,
                logged_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                payload TEXT
            )
            "#,
            self.qualified(log_table)
        )
    }
}

#[async_trait::async_trait]
impl CatalogReader for PostgresCatalog {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn list_tables(&self) -> Result<Vec<String>, CatalogError> {
        tracing::debug!(schema = %self.schema, "listing tables");
        let rows = self
            .client
            .query(
                r#"
                SELECT table_name::text
                FROM information_schema.tables
                WHERE table_schema::text = $1::text
                  AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
                &[&self.schema],
            )
            .await
            .map_err(query_error)?;

        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>, CatalogError> {
        let table = self.resolve_table(table).await?;
        self.fetch_columns(&table).await
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>, CatalogError> {
        let table = self.resolve_table(table).await?;
        self.fetch_primary_key(&table).await
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>, CatalogError> {
        let table = self.resolve_table(table).await?;
        self.fetch_foreign_keys(Some(&table)).await
    }

    async fn all_foreign_keys(&self) -> Result<Vec<ForeignKeyMeta>, CatalogError> {
        self.fetch_foreign_keys(None).await
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>, CatalogError> {
        let table = self.resolve_table(table).await?;
        self.fetch_indexes(&table).await
    }

    async fn test_connection(&self) -> Result<(), CatalogError> {
        self.client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| CatalogError::ConnectionError(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    async fn table_shape(&self, table: &str) -> Result<TableShape, CatalogError> {
        let table = self.resolve_table(table).await?;
        let columns = self.fetch_columns(&table).await?;
        let primary_key = self.fetch_primary_key(&table).await?;
        Ok(TableShape::new(table, columns, primary_key))
    }
}

#[async_trait::async_trait]
impl TargetDatabase for PostgresCatalog {
    async fn max_integer(&self, table: &str, column: &str) -> Result<Option<i64>, CatalogError> {
        let sql = format!("SELECT max({})::bigint FROM {}", quote_ident(column), self.qualified(table));
        tracing::debug!(sql = %sql, "reading current maximum");
        let row = self.client.query_one(&sql, &[]).await.map_err(query_error)?;
        Ok(row.get(0))
    }

    async fn execute(&self, statement: &ExecutableStatement) -> Result<u64, CatalogError> {
        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        tracing::debug!(
            table = %statement.table,
            operation = %statement.operation,
            bound = statement.is_bound(),
            "executing statement"
        );

        self.client.execute(&statement.sql, &params).await.map_err(|e| {
            if e.is_closed() {
                CatalogError::ConnectionError(e.to_string())
            } else {
                CatalogError::ExecutionError(db_message(&e))
            }
        })
    }

    async fn count_orphans(&self, fk: &ForeignKeyMeta) -> Result<i64, CatalogError> {
        let sql = format!(
            "SELECT count(*) FROM {child} c WHERE c.{ccol} IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.{pcol} = c.{ccol})",
            child = self.qualified(&fk.child_table),
            ccol = quote_ident(&fk.child_column),
            parent = self.qualified(&fk.parent_table),
            pcol = quote_ident(&fk.parent_column),
        );
        self.count(&sql).await
    }

    async fn count_nulls(&self, fk: &ForeignKeyMeta) -> Result<i64, CatalogError> {
        let sql = format!(
            "SELECT count(*) FROM {} WHERE {} IS NULL",
            self.qualified(&fk.child_table),
            quote_ident(&fk.child_column),
        );
        self.count(&sql).await
    }

    async fn ensure_audit_log(&self, log_table: &str) -> Result<(), CatalogError> {
        tracing::debug!(log_table, "ensuring audit log table");
        self.client
            .batch_execute(&self.audit_log_ddl(log_table))
            .await
            .map_err(query_error)
    }

    async fn recreate_audit_log(&self, log_table: &str) -> Result<(), CatalogError> {
        tracing::warn!(log_table, "dropping and recreating audit log table");
        let ddl = format!(
            "DROP TABLE IF EXISTS {};\n{}",
            self.qualified(log_table),
            self.audit_log_ddl(log_table)
        );
        self.client.batch_execute(&ddl).await.map_err(query_error)
    }

    async fn list_triggers(&self, table: &str) -> Result<Vec<String>, CatalogError> {
        let rows = self
            .client
            .query(
                r#"
                SELECT DISTINCT trigger_name::text
                FROM information_schema.triggers
                WHERE event_object_schema::text = $1::text
                  AND event_object_table::text = $2::text
                ORDER BY 1
                "#,
                &[&self.schema, &table],
            )
            .await
            .map_err(query_error)?;

        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn drop_trigger(&self, table: &str, name: &str) -> Result<(), CatalogError> {
        let ddl = format!("DROP TRIGGER {} ON {}", quote_ident(name), self.qualified(table));
        self.client.batch_execute(&ddl).await.map_err(|e| {
            if e.code() == Some(&SqlState::UNDEFINED_OBJECT) {
                CatalogError::TriggerNotFound(name.to_string())
            } else {
                query_error(e)
            }
        })
    }

    async fn create_audit_trigger(&self, trigger: &AuditTrigger) -> Result<(), CatalogError> {
        self.install_capture_function().await?;

        let referencing = match trigger.operation {
            Operation::Insert => "REFERENCING NEW TABLE AS new_rows",
            Operation::Update => "REFERENCING OLD TABLE AS old_rows NEW TABLE AS new_rows",
            Operation::Delete => "REFERENCING OLD TABLE AS old_rows",
        };

        let name = trigger.name();
        let ddl = format!(
            "CREATE TRIGGER {name} AFTER {op} ON {table} {referencing} \
             FOR EACH STATEMENT EXECUTE FUNCTION {function}({schema}, {log_table})",
            name = quote_ident(&name),
            op = trigger.operation.as_str(),
            table = self.qualified(&trigger.table),
            function = self.qualified(CAPTURE_FUNCTION),
            schema = quote_literal(&self.schema),
            log_table = quote_literal(&trigger.log_table),
        );

        tracing::debug!(trigger = %name, "creating audit trigger");
        self.client.batch_execute(&ddl).await.map_err(|e| {
            if e.code() == Some(&SqlState::DUPLICATE_OBJECT) {
                CatalogError::TriggerExists(name.clone())
            } else {
                query_error(e)
            }
        })
    }

    async fn fetch_audit_entries(
        &self,
        log_table: &str,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLogEntry>, CatalogError> {
        let sql = format!(
            r#"
            SELECT id, table_name, operation, db_user, logged_at, payload
            FROM {}
            WHERE ($1::text IS NULL OR lower(table_name) = lower($1::text))
              AND ($2::text IS NULL OR upper(operation) = $2::text)
              AND ($3::timestamptz IS NULL OR logged_at >= $3::timestamptz)
              AND ($4::timestamptz IS NULL OR logged_at < $4::timestamptz)
            ORDER BY logged_at DESC, id DESC
            LIMIT $5::bigint
            "#,
            self.qualified(log_table)
        );

        let operation = filter.operation.map(|op| op.as_str().to_string());
        let rows = self
            .client
            .query(
                &sql,
                &[&filter.table, &operation, &filter.since, &filter.until, &filter.limit],
            )
            .await
            .map_err(query_error)?;

        Ok(rows
            .iter()
            .map(|row| {
                let logged_at: DateTime<Utc> = row.get(4);
                let payload: Option<String> = row.get(5);
                AuditLogEntry {
                    id: row.get(0),
                    table: row.get(1),
                    operation: row.get(2),
                    user: row.get(3),
                    timestamp: logged_at,
                    payload: AuditLogEntry::parse_payload(payload.as_deref()),
                }
            })
            .collect())
    }
}

/// Drive the connection in the background until the client is dropped
fn spawn_connection<F>(host: String, port: u16, connection: F)
where
    F: std::future::Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(host = %host, port, error = %e, "PostgreSQL connection error");
        }
    });
}

fn connect_error(host: &str, port: u16, e: tokio_postgres::Error) -> CatalogError {
    CatalogError::ConnectionError(format!("Failed to connect to PostgreSQL at {}:{}: {}", host, port, e))
}

fn query_error(e: tokio_postgres::Error) -> CatalogError {
    if e.is_closed() {
        return CatalogError::ConnectionError(e.to_string());
    }
    match e.code() {
        Some(code) if *code == SqlState::INSUFFICIENT_PRIVILEGE => CatalogError::PermissionDenied(db_message(&e)),
        Some(code) if *code == SqlState::UNDEFINED_TABLE => CatalogError::TableNotFound(db_message(&e)),
        Some(code) if *code == SqlState::UNDEFINED_COLUMN => CatalogError::ColumnNotFound(db_message(&e)),
        _ => CatalogError::QueryError(db_message(&e)),
    }
}

/// Server message when there is one; the driver's own text otherwise
fn db_message(e: &tokio_postgres::Error) -> String {
    e.as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| e.to_string())
}

/// A type name usable as a cast target
pub(crate) fn declared_type(data_type: &str, udt_name: &str) -> String {
    match data_type {
        "USER-DEFINED" => udt_name.to_string(),
        "ARRAY" => format!("{}[]", udt_name.strip_prefix('_').unwrap_or(udt_name)),
        other => other.to_string(),
    }
}

/// `pg_constraint` action code; `a` (no action) is the engine default and maps to `None`
pub(crate) fn action_from_code(code: &str) -> Option<ReferentialAction> {
    match code {
        "r" => Some(ReferentialAction::Restrict),
        "c" => Some(ReferentialAction::Cascade),
        "n" => Some(ReferentialAction::SetNull),
        "d" => Some(ReferentialAction::SetDefault),
        _ => None,
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_resolution() {
        assert_eq!(declared_type("integer", "int4"), "integer");
        assert_eq!(declared_type("character varying", "varchar"), "character varying");
        assert_eq!(declared_type("USER-DEFINED", "order_status"), "order_status");
        assert_eq!(declared_type("ARRAY", "_int4"), "int4[]");
    }

    #[test]
    fn action_codes() {
        assert_eq!(action_from_code("a"), None);
        assert_eq!(action_from_code("c"), Some(ReferentialAction::Cascade));
        assert_eq!(action_from_code("n"), Some(ReferentialAction::SetNull));
        assert_eq!(action_from_code("r"), Some(ReferentialAction::Restrict));
        assert_eq!(action_from_code("d"), Some(ReferentialAction::SetDefault));
    }

    #[test]
    fn identifier_and_literal_quoting() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
