//! Configuration schema (refaudit.toml)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::audit_log::DEFAULT_AUDIT_LOG_TABLE;
use crate::check::CheckKind;

/// Target database connection parameters
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Connect over TLS
    #[serde(default)]
    pub tls: bool,

    /// Schema to inspect and mutate
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            tls: false,
            schema: default_schema(),
        }
    }
}

// Hand-written so the password never reaches logs
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("tls", &self.tls)
            .field("schema", &self.schema)
            .finish()
    }
}

impl ConnectionConfig {
    /// Reject blank required parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&str> = [
            ("host", &self.host),
            ("database", &self.database),
            ("user", &self.user),
            ("password", &self.password),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingConnectionParams(missing.join(", ")));
        }
        if self.schema.trim().is_empty() {
            return Err(ConfigError::MissingConnectionParams("schema".to_string()));
        }
        Ok(())
    }

    /// libpq-style key/value string with values quoted
    pub fn to_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.user),
            quote_conn_value(&self.password),
        )
    }
}

fn quote_conn_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// How reconciled inserts are sent to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Bind every value as a parameter
    Bound,

    /// Send the re-serialized literal statement
    Literal,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Bound
    }
}

/// Mutation audit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Audit log table name
    #[serde(default = "default_log_table")]
    pub log_table: String,

    #[serde(default)]
    pub execution: ExecutionMode,
}

fn default_log_table() -> String {
    DEFAULT_AUDIT_LOG_TABLE.to_string()
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            log_table: default_log_table(),
            execution: ExecutionMode::default(),
        }
    }
}

/// Per-call time limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Limit for every database round-trip, in milliseconds
    #[serde(default = "default_query_ms")]
    pub query_ms: u64,
}

fn default_query_ms() -> u64 {
    30_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_ms: default_query_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_ms)
    }
}

/// Anomaly scan settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Checks to run; empty means all
    #[serde(default)]
    pub checks: Vec<CheckKind>,
}

impl ScanConfig {
    pub fn enabled_checks(&self) -> Vec<CheckKind> {
        if self.checks.is_empty() {
            CheckKind::ALL.to_vec()
        } else {
            self.checks.clone()
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub scan: ScanConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Missing connection parameters: {0}")]
    MissingConnectionParams(String),
}

impl From<ConfigError> for crate::error::AuditError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.connection.port, 5432);
        assert_eq!(config.connection.schema, "public");
        assert_eq!(config.audit.log_table, "audit_log");
        assert_eq!(config.audit.execution, ExecutionMode::Bound);
        assert_eq!(config.scan.enabled_checks().len(), CheckKind::ALL.len());
    }

    #[test]
    fn parse_full_config() {
        let config = Config::from_toml(
            r#"
            [connection]
            host = "db.internal"
            database = "shop"
            user = "auditor"
            password = "s3cret"
            tls = true

            [audit]
            log_table = "change_log"
            execution = "literal"

            [timeouts]
            query_ms = 2500

            [scan]
            checks = ["isolated_tables", "orphan_records"]
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.port, 5432);
        assert!(config.connection.tls);
        assert_eq!(config.audit.log_table, "change_log");
        assert_eq!(config.audit.execution, ExecutionMode::Literal);
        assert_eq!(config.timeouts.query_timeout(), Duration::from_millis(2500));
        assert_eq!(
            config.scan.enabled_checks(),
            vec![CheckKind::IsolatedTables, CheckKind::OrphanRecords]
        );
    }

    #[test]
    fn unknown_check_is_a_parse_error() {
        let result = Config::from_toml("[scan]\nchecks = [\"everything\"]\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn blank_connection_params_are_rejected() {
        let mut conn = ConnectionConfig::default();
        conn.host = "localhost".to_string();
        conn.user = "  ".to_string();

        let err = conn.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing connection parameters: database, user, password");
    }

    #[test]
    fn debug_output_redacts_password() {
        let mut conn = ConnectionConfig::default();
        conn.password = "hunter2".to_string();
        let debug = format!("{:?}", conn);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn connection_string_quotes_values() {
        let conn = ConnectionConfig {
            host: "localhost".into(),
            database: "shop".into(),
            user: "app".into(),
            password: "it's".into(),
            ..ConnectionConfig::default()
        };
        assert_eq!(
            conn.to_connection_string(),
            r"host='localhost' port=5432 dbname='shop' user='app' password='it\'s'"
        );
    }
}
