//! Classify-then-reconcile behaviour over realistic table shapes

use pretty_assertions::assert_eq;
use refaudit_core::{ColumnMeta, ErrorKind, Operation, TableShape};
use refaudit_sql::{classify, needs_surrogate_key, reconcile};
use std::collections::BTreeSet;

fn customers() -> TableShape {
    TableShape::new(
        "customers",
        vec![
            ColumnMeta::new("customers", "id", "integer").not_null(),
            ColumnMeta::new("customers", "name", "character varying").with_max_length(80).not_null(),
            ColumnMeta::new("customers", "email", "character varying").with_max_length(120),
            ColumnMeta::new("customers", "credit", "numeric"),
        ],
        vec!["id".into()],
    )
}

fn column_set(statement: &str) -> BTreeSet<String> {
    let mutation = classify(statement).unwrap();
    mutation
        .assignments()
        .iter()
        .map(|a| a.column.to_ascii_lowercase())
        .collect()
}

#[test]
fn complete_insert_keeps_its_column_set() {
    let raw = "INSERT INTO customers (id, name, email, credit) VALUES (5, 'Ada', 'ada@example.com', 12.50)";
    let mutation = classify(raw).unwrap();
    let result = reconcile(&mutation, &customers(), Some(4));

    assert!(result.ok);
    assert_eq!(result.injected_primary_key, None);

    let corrected = result.corrected_statement.unwrap();
    assert_eq!(column_set(&corrected), column_set(raw));
    assert_eq!(
        corrected,
        "INSERT INTO customers (id, name, email, credit) VALUES (5, 'Ada', 'ada@example.com', 12.50)"
    );
}

#[test]
fn omitted_key_gets_next_value() {
    let mutation = classify("insert into customers (name) values ('Grace')").unwrap();
    assert!(needs_surrogate_key(&mutation, &customers()));

    let empty = reconcile(&mutation, &customers(), None);
    assert_eq!(empty.injected_primary_key, Some(1));

    let populated = reconcile(&mutation, &customers(), Some(17));
    assert_eq!(populated.injected_primary_key, Some(18));
    assert_eq!(
        populated.corrected_statement.as_deref(),
        Some("INSERT INTO customers (name, id) VALUES ('Grace', 18)")
    );
}

#[test]
fn unknown_column_is_reported_exactly() {
    let mutation = classify("INSERT INTO customers (name, phone) VALUES ('Linus', '555-0100')").unwrap();
    let result = reconcile(&mutation, &customers(), None);

    assert!(!result.ok);
    assert_eq!(result.missing_columns, BTreeSet::from(["phone".to_string()]));
    assert_eq!(result.error().unwrap().kind(), ErrorKind::MissingColumns);
}

#[test]
fn classification_failures_carry_taxonomy_kinds() {
    let unrecognized: refaudit_core::AuditError = classify("TRUNCATE customers").unwrap_err().into();
    assert_eq!(unrecognized.kind(), ErrorKind::Unrecognized);

    let arity: refaudit_core::AuditError = classify("INSERT INTO customers (id, name) VALUES (1)")
        .unwrap_err()
        .into();
    assert_eq!(arity.kind(), ErrorKind::ArityMismatch);
}

#[test]
fn bound_statement_matches_literal_values() {
    let mutation = classify("INSERT INTO customers (name, email) VALUES ('O''Brien', NULL)").unwrap();
    let result = reconcile(&mutation, &customers(), Some(2));

    assert!(result.injection_risk);

    let bound = result.bound.unwrap();
    assert_eq!(bound.table, "customers");
    assert_eq!(bound.operation, Operation::Insert);
    assert_eq!(
        bound.params,
        vec![Some("O'Brien".to_string()), None, Some("3".to_string())]
    );
}
