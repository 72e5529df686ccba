//! Test fixtures for engine integration tests
//!
//! A shop schema with known problems:
//! - orders has one orphaned row (customer 2) and one NULL customer
//! - customers.region_id follows the naming convention but is not declared
//! - invoices, orders, region and tags are never referenced
//! - orders.customer_id has no index and is nullable, unlike customers.id
//! - tags has no primary key

#![allow(dead_code)]

use refaudit_catalog::{row, MockDatabase, MockDatabaseBuilder};
use refaudit_core::{AuditSettings, ColumnMeta, ExecutionMode, ForeignKeyMeta, IndexMeta, TimeoutConfig};
use serde_json::{json, Value};

pub const LOG_TABLE: &str = "audit_log";

fn schema() -> MockDatabaseBuilder {
    MockDatabaseBuilder::new()
        .with_table(
            "customers",
            vec![
                ColumnMeta::new("customers", "id", "integer").not_null(),
                ColumnMeta::new("customers", "name", "character varying").with_max_length(80).not_null(),
                ColumnMeta::new("customers", "region_id", "integer"),
            ],
            vec!["id"],
        )
        .with_table(
            "region",
            vec![
                ColumnMeta::new("region", "id", "integer").not_null(),
                ColumnMeta::new("region", "name", "text"),
            ],
            vec!["id"],
        )
        .with_table(
            "orders",
            vec![
                ColumnMeta::new("orders", "id", "integer").not_null(),
                ColumnMeta::new("orders", "customer_id", "integer"),
                ColumnMeta::new("orders", "note", "text"),
            ],
            vec!["id"],
        )
        .with_table(
            "invoices",
            vec![
                ColumnMeta::new("invoices", "id", "integer").not_null(),
                ColumnMeta::new("invoices", "customer_id", "integer"),
            ],
            vec!["id"],
        )
        .with_table("tags", vec![ColumnMeta::new("tags", "label", "text")], vec![])
        .with_index(IndexMeta::new("customers", "customers_pkey", vec!["id".into()]).primary())
        .with_index(IndexMeta::new("orders", "orders_pkey", vec!["id".into()]).primary())
        .with_index(IndexMeta::new("invoices", "invoices_pkey", vec!["id".into()]).primary())
        .with_foreign_key(ForeignKeyMeta::new(
            "fk_orders_customer",
            "orders",
            "customer_id",
            "customers",
            "id",
        ))
        .with_rows(
            "customers",
            vec![row(&[("id", json!(1)), ("name", json!("Ada"))])],
        )
}

/// customers {1}; orders {fk=1}, {fk=2}, {fk=NULL}
pub fn shop_database() -> MockDatabase {
    schema()
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

/// Same schema, no orders yet
pub fn empty_orders_database() -> MockDatabase {
    schema().build()
}

/// Schema plus extra builder steps (failures, latency)
pub fn shop_builder() -> MockDatabaseBuilder {
    schema()
}

pub fn bound_settings() -> AuditSettings {
    AuditSettings {
        log_table: LOG_TABLE.to_string(),
        execution: ExecutionMode::Bound,
    }
}

pub fn literal_settings() -> AuditSettings {
    AuditSettings {
        log_table: LOG_TABLE.to_string(),
        execution: ExecutionMode::Literal,
    }
}

pub fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig { query_ms: 2_000 }
}
