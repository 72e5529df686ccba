//! Catalog metadata types
//!
//! Snapshots of what the live catalog reports about tables, columns, keys
//! and indexes. These are plain values; nothing here talks to a database.

use serde::{Deserialize, Serialize};

/// A column as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Owning table
    pub table: String,

    /// Column name
    pub name: String,

    /// Declared type, in a form the backend accepts as a cast target
    pub declared_type: String,

    /// Maximum character length for bounded string types
    pub max_length: Option<i32>,

    /// Whether NULL is allowed
    pub nullable: bool,
}

impl ColumnMeta {
    /// Create a nullable column without a length bound
    pub fn new(table: impl Into<String>, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            declared_type: declared_type.into(),
            max_length: None,
            nullable: true,
        }
    }

    /// Set the maximum character length
    pub fn with_max_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Mark the column NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set nullability explicitly
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// `table.column`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.name)
    }

    /// Type plus length, e.g. `character varying(40)`
    pub fn type_signature(&self) -> String {
        match self.max_length {
            Some(len) => format!("{}({})", self.declared_type, len),
            None => self.declared_type.clone(),
        }
    }
}

/// Referential action declared on a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// SQL spelling of the action
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

impl std::fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// One column pair of a declared foreign key
///
/// Composite keys are represented as several entries sharing a `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyMeta {
    /// Constraint name
    pub name: String,

    /// Referencing table
    pub child_table: String,

    /// Referencing column
    pub child_column: String,

    /// Referenced table
    pub parent_table: String,

    /// Referenced column
    pub parent_column: String,

    /// Action on insert (absent on engines that cannot declare one)
    pub on_insert: Option<ReferentialAction>,

    /// Action on update of the parent key; `None` means left at the engine default
    pub on_update: Option<ReferentialAction>,

    /// Action on delete of the parent row; `None` means left at the engine default
    pub on_delete: Option<ReferentialAction>,
}

impl ForeignKeyMeta {
    /// Create a foreign key with no declared actions
    pub fn new(
        name: impl Into<String>,
        child_table: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            child_table: child_table.into(),
            child_column: child_column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            on_insert: None,
            on_update: None,
            on_delete: None,
        }
    }

    /// Set the ON UPDATE action
    pub fn with_on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Set the ON DELETE action
    pub fn with_on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Whether this key links `child` to `parent`
    pub fn links(&self, child: &str, parent: &str) -> bool {
        self.child_table.eq_ignore_ascii_case(child) && self.parent_table.eq_ignore_ascii_case(parent)
    }

    /// `child_table.child_column`
    pub fn qualified_child(&self) -> String {
        format!("{}.{}", self.child_table, self.child_column)
    }

    /// `parent_table.parent_column`
    pub fn qualified_parent(&self) -> String {
        format!("{}.{}", self.parent_table, self.parent_column)
    }
}

/// An index on a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Owning table
    pub table: String,

    /// Index name
    pub name: String,

    /// Indexed columns in key order
    pub columns: Vec<String>,

    /// Unique index
    pub unique: bool,

    /// Backs the primary key constraint
    pub primary: bool,
}

impl IndexMeta {
    /// Create a plain (non-unique) index
    pub fn new(table: impl Into<String>, name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            columns,
            unique: false,
            primary: false,
        }
    }

    /// Mark as unique
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark as the primary key index (implies unique)
    pub fn primary(mut self) -> Self {
        self.unique = true;
        self.primary = true;
        self
    }

    /// Whether `column` is the leading key column, i.e. usable for lookups on it alone
    pub fn leads_with(&self, column: &str) -> bool {
        self.columns
            .first()
            .map(|c| c.eq_ignore_ascii_case(column))
            .unwrap_or(false)
    }
}

/// Columns and primary key of one table, as read for a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableShape {
    pub table: String,
    pub columns: Vec<ColumnMeta>,
    pub primary_key: Vec<String>,
}

impl TableShape {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnMeta>, primary_key: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            primary_key,
        }
    }

    /// Find a column by name, ignoring ASCII case (unquoted identifiers fold)
    pub fn find_column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column names in catalog order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The primary key column when it is the single column `id`
    pub fn surrogate_key(&self) -> Option<&str> {
        match self.primary_key.as_slice() {
            [only] if only.eq_ignore_ascii_case("id") => Some(only.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_signature_includes_length() {
        let col = ColumnMeta::new("users", "email", "character varying").with_max_length(120);
        assert_eq!(col.type_signature(), "character varying(120)");
        assert_eq!(ColumnMeta::new("users", "id", "integer").type_signature(), "integer");
    }

    #[test]
    fn surrogate_key_requires_single_id_column() {
        let cols = vec![ColumnMeta::new("orders", "id", "integer").not_null()];
        assert_eq!(TableShape::new("orders", cols.clone(), vec!["id".into()]).surrogate_key(), Some("id"));
        assert_eq!(TableShape::new("orders", cols.clone(), vec![]).surrogate_key(), None);
        assert_eq!(
            TableShape::new("orders", cols, vec!["id".into(), "tenant".into()]).surrogate_key(),
            None
        );
    }

    #[test]
    fn index_leading_column() {
        let idx = IndexMeta::new("orders", "ix_orders_customer", vec!["customer_id".into(), "placed_at".into()]);
        assert!(idx.leads_with("customer_id"));
        assert!(!idx.leads_with("placed_at"));
    }

    #[test]
    fn foreign_key_links_case_insensitively() {
        let fk = ForeignKeyMeta::new("fk_orders_customer", "orders", "customer_id", "customers", "id");
        assert!(fk.links("Orders", "CUSTOMERS"));
        assert!(!fk.links("customers", "orders"));
        assert_eq!(fk.qualified_child(), "orders.customer_id");
    }
}
