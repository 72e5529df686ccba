//! Tables no foreign key points at

use crate::snapshot::SchemaSnapshot;
use refaudit_core::{AnomalyKind, AnomalyRecord, ScanLog};
use std::collections::HashSet;

/// One record per table that is never the parent side of a foreign key
///
/// A table that only references others is still isolated.
pub fn isolated_tables(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> Vec<AnomalyRecord> {
    log.info("Looking for tables not referenced by any foreign key");

    let referenced: HashSet<String> = snapshot
        .foreign_keys
        .iter()
        .map(|fk| fk.parent_table.to_ascii_lowercase())
        .collect();

    let mut seen = HashSet::new();
    snapshot
        .tables
        .iter()
        .filter(|table| !referenced.contains(&table.to_ascii_lowercase()))
        .filter(|table| seen.insert(table.to_ascii_lowercase()))
        .map(|table| {
            AnomalyRecord::new(
                AnomalyKind::IsolatedTable,
                table.clone(),
                "This table is not referenced by any foreign key",
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use refaudit_core::ForeignKeyMeta;

    #[test]
    fn only_unreferenced_tables_are_reported() {
        let snapshot = SchemaSnapshot {
            tables: vec!["customers".into(), "orders".into(), "tags".into()],
            foreign_keys: vec![ForeignKeyMeta::new("fk", "orders", "customer_id", "Customers", "id")],
            ..SchemaSnapshot::default()
        };

        let mut log = ScanLog::new();
        let tables: Vec<String> = isolated_tables(&snapshot, &mut log)
            .into_iter()
            .map(|r| r.table)
            .collect();
        assert_eq!(tables, vec!["orders", "tags"]);
    }

    #[test]
    fn self_reference_counts_as_referenced() {
        let snapshot = SchemaSnapshot {
            tables: vec!["employees".into()],
            foreign_keys: vec![ForeignKeyMeta::new("fk_manager", "employees", "manager_id", "employees", "id")],
            ..SchemaSnapshot::default()
        };

        assert!(isolated_tables(&snapshot, &mut ScanLog::new()).is_empty());
    }
}
