//! Test fixtures for catalog integration tests
//!
//! A small shop schema with the usual integrity problems: an orphaned
//! order, a NULL customer reference, an undeclared `invoices.customer_id`
//! reference and a table nothing points at.

#![allow(dead_code)]

use refaudit_catalog::{row, MockDatabase, MockDatabaseBuilder};
use refaudit_core::{ColumnMeta, ForeignKeyMeta, IndexMeta, ReferentialAction};
use serde_json::{json, Value};

pub fn customers_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("customers", "id", "integer").not_null(),
        ColumnMeta::new("customers", "name", "character varying").with_max_length(80).not_null(),
        ColumnMeta::new("customers", "email", "character varying").with_max_length(120),
    ]
}

pub fn orders_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("orders", "id", "integer").not_null(),
        ColumnMeta::new("orders", "customer_id", "integer"),
        ColumnMeta::new("orders", "placed_at", "timestamp with time zone").not_null(),
    ]
}

pub fn invoices_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("invoices", "id", "integer").not_null(),
        ColumnMeta::new("invoices", "customer_id", "integer"),
        ColumnMeta::new("invoices", "total", "numeric"),
    ]
}

pub fn tags_columns() -> Vec<ColumnMeta> {
    vec![
        ColumnMeta::new("tags", "id", "integer").not_null(),
        ColumnMeta::new("tags", "label", "text"),
    ]
}

pub fn orders_customer_fk() -> ForeignKeyMeta {
    ForeignKeyMeta::new("fk_orders_customer", "orders", "customer_id", "customers", "id")
        .with_on_delete(ReferentialAction::Cascade)
}

/// customers {1}, orders {fk=1}, {fk=2}, {fk=NULL}
pub fn shop_database() -> MockDatabase {
    MockDatabaseBuilder::new()
        .with_table("customers", customers_columns(), vec!["id"])
        .with_table("orders", orders_columns(), vec!["id"])
        .with_table("invoices", invoices_columns(), vec!["id"])
        .with_table("tags", tags_columns(), vec!["id"])
        .with_index(IndexMeta::new("customers", "customers_pkey", vec!["id".into()]).primary())
        .with_index(IndexMeta::new("orders", "orders_pkey", vec!["id".into()]).primary())
        .with_foreign_key(orders_customer_fk())
        .with_rows("customers", vec![row(&[("id", json!(1)), ("name", json!("Ada"))])])
        .with_rows(
            "orders",
            vec![
                row(&[("id", json!(1)), ("customer_id", json!(1))]),
                row(&[("id", json!(2)), ("customer_id", json!(2))]),
                row(&[("id", json!(3)), ("customer_id", Value::Null)]),
            ],
        )
        .build()
}
