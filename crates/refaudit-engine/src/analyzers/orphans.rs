//! Orphan and NULL records per declared foreign key

use refaudit_core::{AnomalyKind, AnomalyRecord, FkViolationCounts, ForeignKeyMeta, ScanLog};

/// What could be counted for one foreign key column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCounts {
    Counted(FkViolationCounts),

    /// An end of the key (named here) does not exist, so nothing was counted
    Dangling(String),
}

/// Records for every key column with orphaned rows or NULL values
///
/// `counts` pairs each foreign key column with what the database reported
/// for it; zero counts produce nothing. A dangling key is reported as such.
pub fn orphan_records(counts: &[(ForeignKeyMeta, KeyCounts)], log: &mut ScanLog) -> Vec<AnomalyRecord> {
    let mut anomalies = Vec::new();
    for (fk, counts) in counts {
        let counts = match counts {
            KeyCounts::Counted(counts) => counts,
            KeyCounts::Dangling(missing) => {
                log.warn(format!("Foreign key {} refers to missing {}; rows not counted", fk.name, missing));
                anomalies.push(
                    AnomalyRecord::new(
                        AnomalyKind::DanglingReference,
                        fk.child_table.clone(),
                        format!("Foreign key {} refers to {}, which is not in the catalog", fk.name, missing),
                    )
                    .with_column(fk.child_column.clone())
                    .with_related_table(fk.parent_table.clone()),
                );
                continue;
            }
        };
        if counts.orphaned_records > 0 {
            log.warn(format!(
                "{} row(s) in {} reference missing {} rows",
                counts.orphaned_records,
                fk.qualified_child(),
                fk.parent_table
            ));
            anomalies.push(
                AnomalyRecord::new(
                    AnomalyKind::OrphanRecord,
                    fk.child_table.clone(),
                    format!(
                        "{} row(s) reference a {} that does not exist",
                        counts.orphaned_records,
                        fk.qualified_parent()
                    ),
                )
                .with_column(fk.child_column.clone())
                .with_related_table(fk.parent_table.clone()),
            );
        }
        if counts.null_values > 0 {
            anomalies.push(
                AnomalyRecord::new(
                    AnomalyKind::NullViolation,
                    fk.child_table.clone(),
                    format!("{} row(s) hold NULL in this foreign key column", counts.null_values),
                )
                .with_column(fk.child_column.clone())
                .with_related_table(fk.parent_table.clone()),
            );
        }
    }
    anomalies
}
