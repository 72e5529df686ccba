//! Columns that look like foreign keys but are not declared as such

use crate::snapshot::SchemaSnapshot;
use refaudit_core::{AnomalyKind, AnomalyRecord, ScanLog};
use std::collections::HashSet;

/// Columns sharing a name with another table's primary key column
///
/// A column is skipped when it is already declared as a foreign key to that
/// table, or when it is its own table's `id` key (every `id` would match
/// every other `id` otherwise). Shared-key tables whose primary key carries
/// another table's key name are reported.
pub fn false_foreign_keys(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> Vec<AnomalyRecord> {
    log.info("Looking for columns named like primary keys of other tables");

    let declared: HashSet<(String, String, String)> = snapshot
        .foreign_keys
        .iter()
        .map(|fk| {
            (
                fk.child_table.to_ascii_lowercase(),
                fk.child_column.to_ascii_lowercase(),
                fk.parent_table.to_ascii_lowercase(),
            )
        })
        .collect();

    let mut seen = HashSet::new();
    let mut anomalies = Vec::new();

    for pk_table in &snapshot.tables {
        for pk_column in snapshot.primary_key(pk_table) {
            for table in &snapshot.tables {
                if table.eq_ignore_ascii_case(pk_table) {
                    continue;
                }
                let Some(column) = snapshot.column(table, pk_column) else {
                    continue;
                };
                let key = (
                    table.to_ascii_lowercase(),
                    column.name.to_ascii_lowercase(),
                    pk_table.to_ascii_lowercase(),
                );
                if declared.contains(&key) || !seen.insert(key) {
                    continue;
                }
                if column.name.eq_ignore_ascii_case("id")
                    && snapshot.primary_key(table).iter().any(|c| c.eq_ignore_ascii_case("id"))
                {
                    continue;
                }

                log.warn(format!(
                    "Column {} matches primary key {}.{} without a foreign key",
                    column.qualified_name(),
                    pk_table,
                    pk_column
                ));
                anomalies.push(
                    AnomalyRecord::new(
                        AnomalyKind::FalseForeignKey,
                        table.clone(),
                        format!(
                            "This column may reference {}.{} but is not a foreign key",
                            pk_table, pk_column
                        ),
                    )
                    .with_column(column.name.clone())
                    .with_related_table(pk_table.clone()),
                );
            }
        }
    }

    anomalies
}
