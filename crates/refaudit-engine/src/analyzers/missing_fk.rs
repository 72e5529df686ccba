//! Naming-convention foreign key detection
//!
//! A column named `<table>_id` or `id_<table>` is taken to reference
//! `<table>.id`. This is a heuristic: it misses keys with other names and can
//! suggest keys nobody intended.

use crate::snapshot::SchemaSnapshot;
use refaudit_core::{AnomalyKind, AnomalyRecord, ForeignKeyMeta, PotentialForeignKey, RelationshipReport, ScanLog};
use std::collections::HashSet;

/// Table name a column's name points at, if it follows the convention
fn referenced_name(column: &str) -> Option<&str> {
    let lower = column.to_ascii_lowercase();
    let stripped = if lower.ends_with("_id") {
        &column[..column.len() - 3]
    } else if lower.starts_with("id_") {
        &column[3..]
    } else {
        return None;
    };
    (!stripped.is_empty()).then_some(stripped)
}

/// Every foreign key suggested by column names
pub fn potential_foreign_keys(snapshot: &SchemaSnapshot) -> Vec<PotentialForeignKey> {
    let mut potential = Vec::new();
    for table in &snapshot.tables {
        for column in snapshot.table_columns(table) {
            let Some(parent) = referenced_name(&column.name).and_then(|name| snapshot.table_name(name)) else {
                continue;
            };
            potential.push(PotentialForeignKey {
                child_table: table.clone(),
                child_column: column.name.clone(),
                parent_table: parent.to_string(),
                parent_column: "id".to_string(),
            });
        }
    }
    potential
}

fn declared_set(foreign_keys: &[ForeignKeyMeta]) -> HashSet<(String, String, String, String)> {
    foreign_keys
        .iter()
        .map(|fk| {
            (
                fk.child_table.to_ascii_lowercase(),
                fk.child_column.to_ascii_lowercase(),
                fk.parent_table.to_ascii_lowercase(),
                fk.parent_column.to_ascii_lowercase(),
            )
        })
        .collect()
}

fn missing(snapshot: &SchemaSnapshot, potential: &[PotentialForeignKey]) -> Vec<PotentialForeignKey> {
    let declared = declared_set(&snapshot.foreign_keys);
    potential
        .iter()
        .filter(|p| {
            !declared.contains(&(
                p.child_table.to_ascii_lowercase(),
                p.child_column.to_ascii_lowercase(),
                p.parent_table.to_ascii_lowercase(),
                p.parent_column.to_ascii_lowercase(),
            ))
        })
        .cloned()
        .collect()
}

/// Suggested foreign keys with no matching declared constraint
pub fn missing_foreign_keys(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> Vec<AnomalyRecord> {
    log.info("Identifying missing foreign keys");

    missing(snapshot, &potential_foreign_keys(snapshot))
        .into_iter()
        .map(|p| {
            AnomalyRecord::new(
                AnomalyKind::MissingForeignKey,
                p.child_table,
                format!(
                    "Column name suggests a reference to {}.{} but no foreign key is declared",
                    p.parent_table, p.parent_column
                ),
            )
            .with_column(p.child_column)
            .with_related_table(p.parent_table)
        })
        .collect()
}

/// Declared, suggested and missing foreign keys side by side
///
/// Composite keys count once, by their first column.
pub fn relationships(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> RelationshipReport {
    log.info("Starting referential relationship analysis");

    let existing: Vec<ForeignKeyMeta> = snapshot
        .constraints()
        .into_iter()
        .map(|group| group[0].clone())
        .collect();
    let potential = potential_foreign_keys(snapshot);
    let missing = missing(snapshot, &potential);

    let report = RelationshipReport {
        num_existing: existing.len(),
        num_potential: potential.len(),
        num_missing: missing.len(),
        num_anomalies: potential.len() as i64 - existing.len() as i64,
        existing,
        potential,
        missing,
    };

    log.info(format!("Found {} existing foreign keys", report.num_existing));
    log.info(format!("Identified {} potential foreign keys", report.num_potential));
    log.info(format!("Detected {} missing foreign keys", report.num_missing));
    log.info(format!("Detected {} relationship anomalies", report.num_anomalies));
    report
}
