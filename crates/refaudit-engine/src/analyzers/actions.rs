//! Referential actions left at the engine default

use crate::snapshot::SchemaSnapshot;
use refaudit_core::{ActionSummary, AnomalyKind, AnomalyRecord, ReferentialAction, ScanLog};
use std::collections::BTreeMap;

/// One record per foreign key per missing ON UPDATE / ON DELETE action
///
/// ON INSERT is never reported: PostgreSQL has no way to declare one.
pub fn undefined_actions(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> Vec<AnomalyRecord> {
    log.info("Checking foreign keys for undefined referential actions");

    let mut anomalies = Vec::new();
    for group in snapshot.constraints() {
        let fk = group[0];
        let events: [(&str, Option<ReferentialAction>); 2] = [("update", fk.on_update), ("delete", fk.on_delete)];
        for (event, action) in events {
            if action.is_some() {
                continue;
            }
            log.warn(format!("No {} action defined on foreign key {}", event, fk.qualified_child()));
            anomalies.push(
                AnomalyRecord::new(
                    AnomalyKind::UndefinedReferentialAction,
                    fk.child_table.clone(),
                    format!("No action is defined for {} on foreign key {}", event, fk.name),
                )
                .with_column(fk.child_column.clone())
                .with_related_table(fk.parent_table.clone()),
            );
        }
    }
    anomalies
}

/// Declared actions of every foreign key, keyed `table.column`
pub fn defined_actions(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> BTreeMap<String, ActionSummary> {
    log.info("Listing referential actions defined on foreign keys");

    snapshot
        .constraints()
        .into_iter()
        .map(|group| {
            let fk = group[0];
            let summary = ActionSummary {
                on_insert: fk.on_insert,
                on_update: fk.on_update,
                on_delete: fk.on_delete,
            };
            (fk.qualified_child(), summary)
        })
        .collect()
}
