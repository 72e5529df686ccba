//! Point-in-time catalog snapshot for one check

use crate::timeout::catalog_call;
use refaudit_catalog::CatalogReader;
use refaudit_core::{AuditError, ColumnMeta, ForeignKeyMeta, IndexMeta};
use std::collections::BTreeMap;
use std::time::Duration;

/// Which parts of the catalog a check reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Needs {
    pub columns: bool,
    pub primary_keys: bool,
    pub indexes: bool,
    pub foreign_keys: bool,
}

impl Needs {
    pub fn columns(mut self) -> Self {
        self.columns = true;
        self
    }

    pub fn primary_keys(mut self) -> Self {
        self.primary_keys = true;
        self
    }

    pub fn indexes(mut self) -> Self {
        self.indexes = true;
        self
    }

    pub fn foreign_keys(mut self) -> Self {
        self.foreign_keys = true;
        self
    }

    /// Everything
    pub fn all() -> Self {
        Self::default().columns().primary_keys().indexes().foreign_keys()
    }
}

/// Tables and whatever metadata was requested, keyed by catalog table name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSnapshot {
    pub tables: Vec<String>,
    pub columns: BTreeMap<String, Vec<ColumnMeta>>,
    pub primary_keys: BTreeMap<String, Vec<String>>,
    pub indexes: BTreeMap<String, Vec<IndexMeta>>,
    pub foreign_keys: Vec<ForeignKeyMeta>,
}

impl SchemaSnapshot {
    /// Read the catalog, one call per table per requested part
    pub async fn capture<D>(db: &D, needs: Needs, limit: Duration) -> Result<Self, AuditError>
    where
        D: CatalogReader + ?Sized,
    {
        let mut snapshot = Self {
            tables: catalog_call(limit, "list_tables", db.list_tables()).await?,
            ..Self::default()
        };

        for table in &snapshot.tables {
            if needs.columns {
                let columns = catalog_call(limit, "columns", db.columns(table)).await?;
                snapshot.columns.insert(table.clone(), columns);
            }
            if needs.primary_keys {
                let pk = catalog_call(limit, "primary_key", db.primary_key(table)).await?;
                snapshot.primary_keys.insert(table.clone(), pk);
            }
            if needs.indexes {
                let indexes = catalog_call(limit, "indexes", db.indexes(table)).await?;
                snapshot.indexes.insert(table.clone(), indexes);
            }
        }

        if needs.foreign_keys {
            snapshot.foreign_keys = catalog_call(limit, "all_foreign_keys", db.all_foreign_keys()).await?;
        }

        tracing::debug!(
            tables = snapshot.tables.len(),
            foreign_keys = snapshot.foreign_keys.len(),
            "captured schema snapshot"
        );
        Ok(snapshot)
    }

    /// Catalog spelling of `name`, ignoring ASCII case
    pub fn table_name(&self, name: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| t.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table_name(name).is_some()
    }

    pub fn table_columns(&self, table: &str) -> &[ColumnMeta] {
        self.table_name(table)
            .and_then(|t| self.columns.get(t))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnMeta> {
        self.table_columns(table)
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
    }

    pub fn primary_key(&self, table: &str) -> &[String] {
        self.table_name(table)
            .and_then(|t| self.primary_keys.get(t))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn table_indexes(&self, table: &str) -> &[IndexMeta] {
        self.table_name(table)
            .and_then(|t| self.indexes.get(t))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The end of `fk` absent from the snapshot, as `table` or `table.column`
    ///
    /// Column ends are only checked for tables whose columns were captured.
    pub fn missing_end(&self, fk: &ForeignKeyMeta) -> Option<String> {
        for (table, column) in [(&fk.child_table, &fk.child_column), (&fk.parent_table, &fk.parent_column)] {
            let Some(name) = self.table_name(table) else {
                return Some(table.clone());
            };
            if self.columns.contains_key(name) && self.column(name, column).is_none() {
                return Some(format!("{}.{}", table, column));
            }
        }
        None
    }

    /// Foreign keys grouped by constraint, in catalog order
    ///
    /// Each group holds the column pairs of one (possibly composite) key.
    pub fn constraints(&self) -> Vec<Vec<&ForeignKeyMeta>> {
        let mut groups: Vec<Vec<&ForeignKeyMeta>> = Vec::new();
        for fk in &self.foreign_keys {
            match groups
                .iter_mut()
                .find(|g| g[0].name == fk.name && g[0].child_table.eq_ignore_ascii_case(&fk.child_table))
            {
                Some(group) => group.push(fk),
                None => groups.push(vec![fk]),
            }
        }
        groups
    }
}
