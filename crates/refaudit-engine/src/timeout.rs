//! Per-call time limits
//!
//! A catalog call that runs out of time is `CatalogUnavailable` (retryable);
//! a statement that runs out of time is `ExecutionTimeout`.

use refaudit_catalog::CatalogError;
use refaudit_core::AuditError;
use std::future::Future;
use std::time::Duration;

/// Run a catalog round-trip under `limit`
pub(crate) async fn catalog_call<T, F>(limit: Duration, what: &str, call: F) -> Result<T, AuditError>
where
    F: Future<Output = Result<T, CatalogError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AuditError::from),
        Err(_) => {
            tracing::warn!(call = what, timeout_ms = limit.as_millis() as u64, "catalog call timed out");
            Err(AuditError::CatalogUnavailable(format!(
                "{} timed out after {}ms",
                what,
                limit.as_millis()
            )))
        }
    }
}

/// Run a mutation under `limit`, attributing failures to `statement`
pub(crate) async fn execution_call<T, F>(limit: Duration, statement: &str, call: F) -> Result<T, AuditError>
where
    F: Future<Output = Result<T, CatalogError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(CatalogError::ExecutionError(message))) => Err(AuditError::ExecutionFailure {
            message,
            statement: statement.to_string(),
        }),
        Ok(Err(other)) => Err(AuditError::from(other)),
        Err(_) => Err(AuditError::ExecutionTimeout {
            statement: statement.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
