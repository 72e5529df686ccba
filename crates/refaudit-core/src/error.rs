//! Error taxonomy
//!
//! Every failure the engine can report maps to one [`ErrorKind`]. The kind
//! codes are stable and appear in JSON results.

use serde::{Deserialize, Serialize};

/// Stable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Statement shape is not insert, update-by-predicate or delete-by-predicate
    Unrecognized,

    /// Insert column and value lists differ in length
    ArityMismatch,

    /// Statement references columns the table does not have
    MissingColumns,

    /// Table or foreign key pair does not exist
    NotFound,

    /// Catalog could not be read (connectivity, permissions, timeout)
    CatalogUnavailable,

    /// The database rejected the final statement
    ExecutionFailure,

    /// The final statement did not complete in time
    ExecutionTimeout,

    /// Naive literal quoting was used on a value that can escape it.
    /// Reported as a warning, never as a failure.
    InjectionRisk,

    /// Configuration or connection parameters are invalid
    InvalidConfig,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unrecognized => "UNRECOGNIZED",
            Self::ArityMismatch => "ARITY_MISMATCH",
            Self::MissingColumns => "MISSING_COLUMNS",
            Self::NotFound => "NOT_FOUND",
            Self::CatalogUnavailable => "CATALOG_UNAVAILABLE",
            Self::ExecutionFailure => "EXECUTION_FAILURE",
            Self::ExecutionTimeout => "EXECUTION_TIMEOUT",
            Self::InjectionRisk => "INJECTION_RISK",
            Self::InvalidConfig => "INVALID_CONFIG",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors surfaced to callers of the engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("Statement not recognized or not supported for auditing: {0}")]
    Unrecognized(String),

    #[error("Column/value count mismatch: {columns} column(s), {values} value(s)")]
    ArityMismatch { columns: usize, values: usize },

    #[error("The following columns do not exist in table {table}: {}", columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Error executing statement: {message}")]
    ExecutionFailure { message: String, statement: String },

    #[error("Statement did not complete within {timeout_ms}ms")]
    ExecutionTimeout { statement: String, timeout_ms: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unrecognized(_) => ErrorKind::Unrecognized,
            Self::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            Self::MissingColumns { .. } => ErrorKind::MissingColumns,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            Self::ExecutionFailure { .. } => ErrorKind::ExecutionFailure,
            Self::ExecutionTimeout { .. } => ErrorKind::ExecutionTimeout,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// The statement that was sent (or about to be sent) when the error occurred
    pub fn attempted_statement(&self) -> Option<&str> {
        match self {
            Self::ExecutionFailure { statement, .. } | Self::ExecutionTimeout { statement, .. } => {
                Some(statement)
            }
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CatalogUnavailable(_) | Self::ExecutionTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_message_lists_names() {
        let err = AuditError::MissingColumns {
            table: "orders".into(),
            columns: vec!["colour".into(), "size".into()],
        };
        assert_eq!(err.to_string(), "The following columns do not exist in table orders: colour, size");
        assert_eq!(err.kind(), ErrorKind::MissingColumns);
    }

    #[test]
    fn execution_errors_carry_statement() {
        let err = AuditError::ExecutionFailure {
            message: "duplicate key".into(),
            statement: "INSERT INTO t (id) VALUES (1)".into(),
        };
        assert_eq!(err.attempted_statement(), Some("INSERT INTO t (id) VALUES (1)"));
        assert!(!err.is_retryable());

        let timeout = AuditError::ExecutionTimeout {
            statement: "DELETE FROM t WHERE id = 1".into(),
            timeout_ms: 500,
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.kind().as_str(), "EXECUTION_TIMEOUT");
    }
}
