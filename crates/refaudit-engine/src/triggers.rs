//! Audit trigger provisioning
//!
//! Every audited table gets `tr_<table>_insert`, `tr_<table>_update` and
//! `tr_<table>_delete`. Provisioning drops whatever trigger holds each name
//! and creates it again, so running it twice leaves the same three triggers.

use crate::timeout::catalog_call;
use refaudit_catalog::TargetDatabase;
use refaudit_core::{AuditError, AuditTrigger, Operation, TimeoutConfig};
use serde::Serialize;
use std::time::Duration;

/// What happened to one table's triggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerProvisioning {
    pub table: String,

    /// Trigger names now in place
    pub installed: Vec<String>,

    /// Trigger names that could not be replaced, with the reason
    pub failed: Vec<(String, String)>,

    /// The table is the audit log itself and was left alone
    pub skipped: bool,
}

impl TriggerProvisioning {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            installed: Vec::new(),
            failed: Vec::new(),
            skipped: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.skipped && self.failed.is_empty()
    }

    /// One line per failed trigger
    pub fn warnings(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|(name, reason)| format!("Audit trigger {} was not installed: {}", name, reason))
            .collect()
    }
}

/// Installs change-capture triggers that write to one audit log table
pub struct TriggerProvisioner<'a> {
    db: &'a dyn TargetDatabase,
    log_table: String,
    limit: Duration,
}

impl<'a> TriggerProvisioner<'a> {
    pub fn new(db: &'a dyn TargetDatabase, log_table: impl Into<String>, timeouts: &TimeoutConfig) -> Self {
        Self {
            db,
            log_table: log_table.into(),
            limit: timeouts.query_timeout(),
        }
    }

    /// Replace the three audit triggers on `table`
    ///
    /// A trigger that fails is recorded and the others are still attempted.
    pub async fn ensure_triggers(&self, table: &str) -> TriggerProvisioning {
        let mut outcome = TriggerProvisioning::new(table);

        if table.eq_ignore_ascii_case(&self.log_table) {
            tracing::info!(table, "not adding audit triggers to the audit log itself");
            outcome.skipped = true;
            return outcome;
        }

        for operation in Operation::ALL {
            let trigger = AuditTrigger::new(table, operation, self.log_table.as_str());
            let name = trigger.name();
            match self.replace(&trigger, &name).await {
                Ok(()) => {
                    tracing::debug!(trigger = %name, "audit trigger installed");
                    outcome.installed.push(name);
                }
                Err(err) => {
                    tracing::warn!(trigger = %name, error = %err, "failed to install audit trigger");
                    outcome.failed.push((name, err.to_string()));
                }
            }
        }

        tracing::info!(
            table,
            installed = outcome.installed.len(),
            failed = outcome.failed.len(),
            "audit triggers provisioned"
        );
        outcome
    }

    async fn replace(&self, trigger: &AuditTrigger, name: &str) -> Result<(), AuditError> {
        match catalog_call(self.limit, "drop_trigger", self.db.drop_trigger(&trigger.table, name)).await {
            Ok(()) => tracing::debug!(trigger = %name, "dropped existing trigger"),
            Err(AuditError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        catalog_call(self.limit, "create_audit_trigger", self.db.create_audit_trigger(trigger)).await
    }
}
