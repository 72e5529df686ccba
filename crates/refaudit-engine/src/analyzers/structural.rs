//! Index, key and column-shape checks on declared foreign keys

use crate::snapshot::SchemaSnapshot;
use refaudit_core::{AnomalyKind, AnomalyRecord, ColumnMeta, ForeignKeyMeta, ScanLog};
use std::collections::BTreeSet;

/// Foreign keys whose first column leads no index on the child table
pub fn unindexed_foreign_keys(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> Vec<AnomalyRecord> {
    log.info("Checking foreign key columns for supporting indexes");

    let mut anomalies = Vec::new();
    for group in snapshot.constraints() {
        let fk = group[0];
        let indexed = snapshot
            .table_indexes(&fk.child_table)
            .iter()
            .any(|idx| idx.leads_with(&fk.child_column));
        if indexed {
            continue;
        }
        log.warn(format!("Foreign key column {} has no index", fk.qualified_child()));
        anomalies.push(
            AnomalyRecord::new(
                AnomalyKind::UnindexedForeignKey,
                fk.child_table.clone(),
                format!(
                    "No index starts with this column; lookups from {} scan the whole table",
                    fk.parent_table
                ),
            )
            .with_column(fk.child_column.clone())
            .with_related_table(fk.parent_table.clone()),
        );
    }
    anomalies
}

fn column_set(columns: &[String]) -> BTreeSet<String> {
    columns.iter().map(|c| c.to_ascii_lowercase()).collect()
}

/// Unique non-primary indexes covering exactly the primary key columns
pub fn duplicate_primary_keys(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> Vec<AnomalyRecord> {
    log.info("Looking for unique indexes that duplicate primary keys");

    let mut anomalies = Vec::new();
    for table in &snapshot.tables {
        let pk = snapshot.primary_key(table);
        if pk.is_empty() {
            log.warn(format!("Table {} has no primary key", table));
            continue;
        }
        let pk_set = column_set(pk);

        for index in snapshot.table_indexes(table) {
            if !index.unique || index.primary || column_set(&index.columns) != pk_set {
                continue;
            }
            anomalies.push(AnomalyRecord::new(
                AnomalyKind::DuplicatePrimaryKey,
                table.clone(),
                format!(
                    "Unique index {} duplicates the primary key ({})",
                    index.name,
                    pk.join(", ")
                ),
            ));
        }
    }
    anomalies
}

/// Both ends of one foreign key column pair, or the end that is missing
enum Ends<'a> {
    Found(&'a ColumnMeta, &'a ColumnMeta),
    Dangling(String),
}

fn resolve<'a>(snapshot: &'a SchemaSnapshot, fk: &ForeignKeyMeta) -> Ends<'a> {
    match (
        snapshot.column(&fk.child_table, &fk.child_column),
        snapshot.column(&fk.parent_table, &fk.parent_column),
    ) {
        (Some(child), Some(parent)) => Ends::Found(child, parent),
        (None, _) => Ends::Dangling(fk.qualified_child()),
        (_, None) => Ends::Dangling(fk.qualified_parent()),
    }
}

/// Foreign key columns whose type or length differs from the referenced column
///
/// A key whose either end is absent from the catalog is reported as a
/// dangling reference instead.
pub fn type_mismatches(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> Vec<AnomalyRecord> {
    log.info("Comparing foreign key column types with referenced columns");

    let mut anomalies = Vec::new();
    for fk in &snapshot.foreign_keys {
        match resolve(snapshot, fk) {
            Ends::Dangling(missing) => {
                log.warn(format!("Foreign key {} refers to missing column {}", fk.name, missing));
                anomalies.push(
                    AnomalyRecord::new(
                        AnomalyKind::DanglingReference,
                        fk.child_table.clone(),
                        format!("Foreign key {} refers to {}, which is not in the catalog", fk.name, missing),
                    )
                    .with_column(fk.child_column.clone())
                    .with_related_table(fk.parent_table.clone()),
                );
            }
            Ends::Found(child, parent) => {
                let (child_type, parent_type) = (child.type_signature(), parent.type_signature());
                if child_type.eq_ignore_ascii_case(&parent_type) {
                    continue;
                }
                anomalies.push(
                    AnomalyRecord::new(
                        AnomalyKind::TypeMismatch,
                        fk.child_table.clone(),
                        format!(
                            "Column type {} differs from referenced {} type {}",
                            child_type,
                            fk.qualified_parent(),
                            parent_type
                        ),
                    )
                    .with_column(fk.child_column.clone())
                    .with_related_table(fk.parent_table.clone()),
                );
            }
        }
    }
    anomalies
}

/// Foreign key columns whose nullability differs from the referenced column
pub fn nullability_mismatches(snapshot: &SchemaSnapshot, log: &mut ScanLog) -> Vec<AnomalyRecord> {
    log.info("Comparing foreign key column nullability with referenced columns");

    let mut anomalies = Vec::new();
    for fk in &snapshot.foreign_keys {
        let Ends::Found(child, parent) = resolve(snapshot, fk) else {
            continue;
        };
        if child.nullable == parent.nullable {
            continue;
        }
        let describe = |nullable: bool| if nullable { "NULL" } else { "NOT NULL" };
        anomalies.push(
            AnomalyRecord::new(
                AnomalyKind::NullabilityMismatch,
                fk.child_table.clone(),
                format!(
                    "Column is {} but referenced {} is {}",
                    describe(child.nullable),
                    fk.qualified_parent(),
                    describe(parent.nullable)
                ),
            )
            .with_column(fk.child_column.clone())
            .with_related_table(fk.parent_table.clone()),
        );
    }
    anomalies
}
