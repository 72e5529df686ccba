//! Audited mutation pipeline
//!
//! classify -> read table shape -> reconcile -> provision audit triggers ->
//! execute -> read back the audit row.
//!
//! The steps are not one transaction. Trigger DDL commits before the
//! statement runs, and a failed statement leaves the triggers in place.

use crate::audit_log::AuditLog;
use crate::timeout::{catalog_call, execution_call};
use crate::triggers::TriggerProvisioner;
use refaudit_catalog::TargetDatabase;
use refaudit_core::{
    AuditError, AuditSettings, ClassifiedMutation, ErrorKind, ExecutableStatement, ExecutionMode,
    MutationAuditResult, Operation, TimeoutConfig,
};
use refaudit_sql::{classify, needs_surrogate_key, reconcile};

/// Runs raw mutation statements with audit capture
pub struct MutationAuditor<'a> {
    db: &'a dyn TargetDatabase,
    settings: AuditSettings,
    timeouts: TimeoutConfig,
}

impl<'a> MutationAuditor<'a> {
    pub fn new(db: &'a dyn TargetDatabase, settings: AuditSettings, timeouts: TimeoutConfig) -> Self {
        Self { db, settings, timeouts }
    }

    /// Audit and execute one statement
    ///
    /// Never fails: every error becomes a result with `status: error`.
    pub async fn audit(&self, raw: &str) -> MutationAuditResult {
        tracing::info!(statement = raw, "auditing mutation");

        let mutation = match classify(raw) {
            Ok(mutation) => mutation,
            Err(err) => {
                let err = AuditError::from(err);
                tracing::warn!(error = %err, "statement rejected by classifier");
                return MutationAuditResult::failure(&err);
            }
        };

        match self.run(raw, &mutation).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "mutation audit failed");
                MutationAuditResult::failure(&err)
                    .with_target(mutation.operation(), mutation.table())
                    .with_resolved_values(mutation.resolved_values())
            }
        }
    }

    async fn run(&self, raw: &str, mutation: &ClassifiedMutation) -> Result<MutationAuditResult, AuditError> {
        let limit = self.timeouts.query_timeout();
        let operation = mutation.operation();

        let shape = catalog_call(limit, "table_shape", self.db.table_shape(mutation.table())).await?;

        // Unlocked read: a concurrent insert can take the same key
        let existing_max = match shape.surrogate_key().filter(|_| needs_surrogate_key(mutation, &shape)) {
            Some(key) => catalog_call(limit, "max_integer", self.db.max_integer(&shape.table, key)).await?,
            None => None,
        };

        let reconciled = reconcile(mutation, &shape, existing_max);
        if let Some(err) = reconciled.error() {
            return Err(err);
        }

        let mut warnings = Vec::new();
        let literal = self.settings.execution == ExecutionMode::Literal;
        if reconciled.injection_risk {
            warnings.push(format!(
                "{}: a text value contains a quote, ';' or '--' and is unsafe in the literal statement{}",
                ErrorKind::InjectionRisk,
                if literal { " that was executed" } else { "" }
            ));
        }

        let log = AuditLog::new(self.db, self.settings.log_table.as_str(), &self.timeouts);
        if let Err(err) = log.ensure().await {
            tracing::warn!(error = %err, "audit log unavailable");
            warnings.push(format!("Audit log {} could not be created: {}", log.table(), err));
        }

        let provisioning = TriggerProvisioner::new(self.db, log.table(), &self.timeouts)
            .ensure_triggers(&shape.table)
            .await;
        warnings.extend(provisioning.warnings());

        let statement = match operation {
            Operation::Insert => reconciled
                .executable(literal)
                .ok_or_else(|| AuditError::Unrecognized(raw.to_string()))?,
            Operation::Update | Operation::Delete => {
                ExecutableStatement::literal(shape.table.clone(), operation, passthrough_sql(raw))
            }
        };

        let executed = execution_call(limit, &statement.sql, self.db.execute(&statement)).await;
        let affected = match executed {
            Ok(affected) => affected,
            Err(err) => {
                tracing::warn!(kind = %err.kind(), error = %err, "statement failed");
                return Ok(MutationAuditResult::failure(&err)
                    .with_target(operation, shape.table.clone())
                    .with_resolved_values(reconciled.mutation.resolved_values())
                    .with_statement_detail(reconciled.corrected_statement, statement.params)
                    .with_warnings(warnings));
            }
        };
        tracing::info!(table = %shape.table, %operation, affected, "statement executed");

        let entry = match log.latest(&shape.table, operation).await {
            Ok(entry) => entry,
            Err(err) => {
                warnings.push(format!("Audit log entry could not be read: {}", err));
                None
            }
        };

        let mut result = MutationAuditResult::success(operation, shape.table.clone())
            .with_resolved_values(reconciled.mutation.resolved_values())
            .with_statement_detail(reconciled.corrected_statement, statement.params)
            .with_warnings(warnings);
        result.executed_statement = Some(statement.sql);
        result.injected_primary_key = reconciled.injected_primary_key;
        result.audit_log_entry = entry;
        Ok(result)
    }
}

/// Update and delete run as written, minus a trailing `;`
fn passthrough_sql(raw: &str) -> &str {
    raw.trim().trim_end_matches(';').trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_strips_terminator() {
        assert_eq!(passthrough_sql("  DELETE FROM t WHERE id = 1 ; \n"), "DELETE FROM t WHERE id = 1");
        assert_eq!(passthrough_sql("UPDATE t SET a = ';' WHERE b = 2"), "UPDATE t SET a = ';' WHERE b = 2");
    }
}
