//! Anomaly scan orchestration
//!
//! Each check reads its own snapshot of the catalog, so a check that cannot
//! read what it needs fails alone; the rest of the report is still produced.

use crate::analyzers::{self, KeyCounts};
use crate::snapshot::{Needs, SchemaSnapshot};
use crate::timeout::catalog_call;
use refaudit_catalog::TargetDatabase;
use refaudit_core::{
    ActionSummary, AnomalyRecord, AuditError, CheckKind, CheckOutcome, FkViolationCounts, FkViolationReport,
    ForeignKeyMeta, RelationshipReport, ScanLog, ScanReport, TimeoutConfig,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// Catalog parts each check reads
fn needs_for(check: CheckKind) -> Needs {
    let needs = Needs::default();
    match check {
        CheckKind::IsolatedTables => needs.foreign_keys(),
        CheckKind::FalseForeignKeys => needs.columns().primary_keys().foreign_keys(),
        CheckKind::OrphanRecords => needs.columns().foreign_keys(),
        CheckKind::MissingForeignKeys => needs.columns().foreign_keys(),
        CheckKind::UndefinedActions => needs.foreign_keys(),
        CheckKind::UnindexedForeignKeys => needs.indexes().foreign_keys(),
        CheckKind::DuplicatePrimaryKeys => needs.primary_keys().indexes(),
        CheckKind::TypeMismatches | CheckKind::NullabilityMismatches => needs.columns().foreign_keys(),
    }
}

/// Runs anomaly checks against one database
pub struct Scanner<'a> {
    db: &'a dyn TargetDatabase,
    limit: Duration,

    /// Tables left out of every analysis (the audit log, typically)
    ignored: Vec<String>,
}

impl<'a> Scanner<'a> {
    pub fn new(db: &'a dyn TargetDatabase, timeouts: &TimeoutConfig) -> Self {
        Self {
            db,
            limit: timeouts.query_timeout(),
            ignored: Vec::new(),
        }
    }

    /// Leave `table` out of every check
    pub fn ignoring(mut self, table: impl Into<String>) -> Self {
        self.ignored.push(table.into());
        self
    }

    /// Run `checks` in order and aggregate the outcomes
    pub async fn scan(&self, checks: &[CheckKind]) -> ScanReport {
        let mut log = ScanLog::new();
        log.info(format!("Starting anomaly scan on {} ({} checks)", self.db.name(), checks.len()));

        let mut outcomes = BTreeMap::new();
        for &check in checks {
            let outcome = match self.run_check(check, &mut log).await {
                Ok(anomalies) => {
                    log.info(format!("Check {} found {} anomalies", check, anomalies.len()));
                    CheckOutcome::completed(check, anomalies)
                }
                Err(err) => {
                    log.error(format!("Check {} could not complete: {}", check, err));
                    CheckOutcome::failed(&err)
                }
            };
            outcomes.insert(check, outcome);
        }

        log.info("Anomaly scan completed");
        ScanReport::from_outcomes(outcomes, log.into_lines())
    }

    async fn run_check(&self, check: CheckKind, log: &mut ScanLog) -> Result<Vec<AnomalyRecord>, AuditError> {
        let snapshot = self.snapshot(needs_for(check)).await?;

        let anomalies = match check {
            CheckKind::IsolatedTables => analyzers::isolated_tables(&snapshot, log),
            CheckKind::FalseForeignKeys => analyzers::false_foreign_keys(&snapshot, log),
            CheckKind::OrphanRecords => {
                log.info("Counting orphaned and NULL foreign key values");
                let mut counts = Vec::with_capacity(snapshot.foreign_keys.len());
                for fk in &snapshot.foreign_keys {
                    let key_counts = match snapshot.missing_end(fk) {
                        Some(missing) => KeyCounts::Dangling(missing),
                        // The catalog can still lose an end between the snapshot and the count
                        None => match self.counts(fk).await {
                            Ok(found) => KeyCounts::Counted(found),
                            Err(AuditError::NotFound(missing)) => KeyCounts::Dangling(missing),
                            Err(err) => return Err(err),
                        },
                    };
                    counts.push((fk.clone(), key_counts));
                }
                analyzers::orphan_records(&counts, log)
            }
            CheckKind::MissingForeignKeys => analyzers::missing_foreign_keys(&snapshot, log),
            CheckKind::UndefinedActions => analyzers::undefined_actions(&snapshot, log),
            CheckKind::UnindexedForeignKeys => analyzers::unindexed_foreign_keys(&snapshot, log),
            CheckKind::DuplicatePrimaryKeys => analyzers::duplicate_primary_keys(&snapshot, log),
            CheckKind::TypeMismatches => analyzers::type_mismatches(&snapshot, log),
            CheckKind::NullabilityMismatches => analyzers::nullability_mismatches(&snapshot, log),
        };
        Ok(anomalies)
    }

    /// Capture a snapshot with ignored tables removed
    async fn snapshot(&self, needs: Needs) -> Result<SchemaSnapshot, AuditError> {
        let mut snapshot = SchemaSnapshot::capture(self.db, needs, self.limit).await?;
        if self.ignored.is_empty() {
            return Ok(snapshot);
        }

        let is_ignored = |name: &str| self.ignored.iter().any(|t| t.eq_ignore_ascii_case(name));
        snapshot.tables.retain(|t| !is_ignored(t));
        snapshot.columns.retain(|t, _| !is_ignored(t));
        snapshot.primary_keys.retain(|t, _| !is_ignored(t));
        snapshot.indexes.retain(|t, _| !is_ignored(t));
        snapshot
            .foreign_keys
            .retain(|fk| !is_ignored(&fk.child_table) && !is_ignored(&fk.parent_table));
        Ok(snapshot)
    }

    async fn counts(&self, fk: &ForeignKeyMeta) -> Result<FkViolationCounts, AuditError> {
        let orphans = catalog_call(self.limit, "count_orphans", self.db.count_orphans(fk)).await?;
        let nulls = catalog_call(self.limit, "count_nulls", self.db.count_nulls(fk)).await?;
        Ok(FkViolationCounts::new(orphans, nulls))
    }

    /// Orphan and NULL counts for every foreign key column linking `child` to `parent`
    ///
    /// `NotFound` when no declared foreign key links the pair, which is not
    /// the same as a link with zero violations.
    pub async fn check_fk(&self, child: &str, parent: &str) -> Result<FkViolationReport, AuditError> {
        let linking: Vec<ForeignKeyMeta> = catalog_call(self.limit, "foreign_keys", self.db.foreign_keys(child))
            .await?
            .into_iter()
            .filter(|fk| fk.links(child, parent))
            .collect();

        let Some(first) = linking.first() else {
            return Err(AuditError::NotFound(format!(
                "No foreign key found between {} and {}",
                child, parent
            )));
        };

        let mut report = FkViolationReport {
            child_table: first.child_table.clone(),
            parent_table: first.parent_table.clone(),
            columns: BTreeMap::new(),
        };
        for fk in &linking {
            let counts = self.counts(fk).await?;
            tracing::debug!(column = %fk.qualified_child(), orphans = counts.orphaned_records, nulls = counts.null_values, "counted violations");
            report.columns.insert(fk.child_column.clone(), counts);
        }
        Ok(report)
    }

    /// Declared vs naming-convention foreign keys
    pub async fn relationships(&self, log: &mut ScanLog) -> Result<RelationshipReport, AuditError> {
        let snapshot = self.snapshot(Needs::default().columns().foreign_keys()).await?;
        Ok(analyzers::relationships(&snapshot, log))
    }

    /// Declared referential actions of every foreign key
    pub async fn defined_actions(&self, log: &mut ScanLog) -> Result<BTreeMap<String, ActionSummary>, AuditError> {
        let snapshot = self.snapshot(Needs::default().foreign_keys()).await?;
        Ok(analyzers::defined_actions(&snapshot, log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_check_reads_foreign_keys_or_keys_and_indexes() {
        for check in CheckKind::ALL {
            let needs = needs_for(check);
            assert!(needs.foreign_keys || (needs.primary_keys && needs.indexes), "{}", check);
        }
    }
}
