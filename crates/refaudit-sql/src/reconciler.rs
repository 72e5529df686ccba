//! Insert reconciliation against catalog metadata
//!
//! Given a classified insert and the target table's shape, find assigned
//! columns the table does not have, inject the next surrogate key when the
//! table's primary key is a lone `id` column that the statement leaves out,
//! and rebuild the statement in two forms:
//!
//! - a literal form with values interpolated (naive quoting, flagged when a
//!   text value could break out of its quotes)
//! - a bound form with `$n` placeholders and text parameters
//!
//! The key allocation is `max(id) + 1` read before the insert. Two concurrent
//! inserts can read the same maximum; the database's key constraint is the
//! only guard.

use refaudit_core::{
    AuditError, Assignment, ClassifiedMutation, ExecutableStatement, Operation, SqlLiteral, TableShape,
};
use std::collections::BTreeSet;

/// Outcome of checking one mutation against its table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// No missing columns
    pub ok: bool,

    /// Assigned columns absent from the table, as spelled in the statement
    pub missing_columns: BTreeSet<String>,

    /// Rebuilt insert with values interpolated
    pub corrected_statement: Option<String>,

    /// Surrogate key value appended to the insert
    pub injected_primary_key: Option<i64>,

    /// The mutation after reconciliation (input unchanged for update/delete)
    pub mutation: ClassifiedMutation,

    /// Rebuilt insert with bind parameters
    pub bound: Option<ExecutableStatement>,

    /// Some text value would escape naive single quoting
    pub injection_risk: bool,

    /// Surrogate key column whose current maximum has no successor
    pub exhausted_key: Option<String>,
}

impl ReconciliationResult {
    fn passthrough(mutation: &ClassifiedMutation) -> Self {
        Self {
            ok: true,
            missing_columns: BTreeSet::new(),
            corrected_statement: None,
            injected_primary_key: None,
            mutation: mutation.clone(),
            bound: None,
            injection_risk: false,
            exhausted_key: None,
        }
    }

    /// Why reconciliation failed: `MissingColumns`, or `ExecutionFailure`
    /// when the surrogate key cannot be advanced
    pub fn error(&self) -> Option<AuditError> {
        if self.ok {
            return None;
        }
        let table = self.mutation.table();
        if let Some(key) = &self.exhausted_key {
            return Some(AuditError::ExecutionFailure {
                message: format!("{}.{} is at {}; no next key can be allocated", table, key, i64::MAX),
                statement: render_literal(table, self.mutation.assignments()),
            });
        }
        Some(AuditError::MissingColumns {
            table: table.to_string(),
            columns: self.missing_columns.iter().cloned().collect(),
        })
    }

    /// The statement to execute for `literal` or bound mode
    pub fn executable(&self, literal: bool) -> Option<ExecutableStatement> {
        if literal {
            self.corrected_statement.as_ref().map(|sql| {
                ExecutableStatement::literal(self.mutation.table(), self.mutation.operation(), sql.clone())
            })
        } else {
            self.bound.clone()
        }
    }
}

/// Whether reconciling `mutation` needs the table's current maximum key
pub fn needs_surrogate_key(mutation: &ClassifiedMutation, shape: &TableShape) -> bool {
    match (mutation, shape.surrogate_key()) {
        (ClassifiedMutation::Insert { .. }, Some(key)) => !mutation.assigns(key),
        _ => false,
    }
}

/// Check a mutation against `shape`.
///
/// `existing_max_id` is the current `max(id)` of the table (`None` when the
/// table is empty). It is only consulted when [`needs_surrogate_key`] holds.
pub fn reconcile(
    mutation: &ClassifiedMutation,
    shape: &TableShape,
    existing_max_id: Option<i64>,
) -> ReconciliationResult {
    let ClassifiedMutation::Insert { table, assignments } = mutation else {
        return ReconciliationResult::passthrough(mutation);
    };

    let missing_columns: BTreeSet<String> = assignments
        .iter()
        .filter(|a| shape.find_column(&a.column).is_none())
        .map(|a| a.column.clone())
        .collect();

    if !missing_columns.is_empty() {
        tracing::debug!(table = %table, missing = ?missing_columns, "insert references unknown columns");
        return ReconciliationResult {
            ok: false,
            missing_columns,
            ..ReconciliationResult::passthrough(mutation)
        };
    }

    let mut assignments = assignments.clone();
    let mut injected_primary_key = None;

    if let Some(key) = shape.surrogate_key().filter(|_| needs_surrogate_key(mutation, shape)) {
        let Some(next) = existing_max_id.map_or(Some(1), |max| max.checked_add(1)) else {
            tracing::warn!(table = %table, key, "surrogate key space exhausted");
            return ReconciliationResult {
                ok: false,
                exhausted_key: Some(key.to_string()),
                ..ReconciliationResult::passthrough(mutation)
            };
        };
        tracing::debug!(table = %table, key, next, "injecting surrogate key");
        assignments.push(Assignment::new(key, SqlLiteral::integer(next)));
        injected_primary_key = Some(next);
    }

    let injection_risk = assignments.iter().any(|a| a.value.is_injection_risk());
    let corrected_statement = render_literal(table, &assignments);
    let bound = render_bound(shape, &assignments);

    ReconciliationResult {
        ok: true,
        missing_columns,
        corrected_statement: Some(corrected_statement),
        injected_primary_key,
        mutation: ClassifiedMutation::Insert {
            table: table.clone(),
            assignments,
        },
        bound: Some(bound),
        injection_risk,
        exhausted_key: None,
    }
}

fn render_literal(table: &str, assignments: &[Assignment]) -> String {
    let columns: Vec<&str> = assignments.iter().map(|a| a.column.as_str()).collect();
    let values: Vec<String> = assignments.iter().map(|a| a.value.render()).collect();

    format!("INSERT INTO {} ({}) VALUES ({})", table, columns.join(", "), values.join(", "))
}

/// Placeholders are cast through text so one parameter type serves every column
fn render_bound(shape: &TableShape, assignments: &[Assignment]) -> ExecutableStatement {
    let mut columns = Vec::with_capacity(assignments.len());
    let mut placeholders = Vec::with_capacity(assignments.len());
    let mut params = Vec::with_capacity(assignments.len());

    for (idx, assignment) in assignments.iter().enumerate() {
        // Every column was found above; fall back to the statement's spelling regardless
        let (name, declared_type) = match shape.find_column(&assignment.column) {
            Some(col) => (col.name.as_str(), col.declared_type.as_str()),
            None => (assignment.column.as_str(), "text"),
        };
        columns.push(quote_ident(name));
        placeholders.push(format!("${}::text::{}", idx + 1, declared_type));
        params.push(assignment.value.as_param());
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&shape.table),
        columns.join(", "),
        placeholders.join(", ")
    );

    ExecutableStatement::bound(shape.table.clone(), Operation::Insert, sql, params)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use pretty_assertions::assert_eq;
    use refaudit_core::ColumnMeta;

    fn orders() -> TableShape {
        TableShape::new(
            "orders",
            vec![
                ColumnMeta::new("orders", "id", "integer").not_null(),
                ColumnMeta::new("orders", "customer_id", "integer"),
                ColumnMeta::new("orders", "note", "text"),
            ],
            vec!["id".into()],
        )
    }

    #[test]
    fn injects_first_key_into_empty_table() {
        let mutation = classify("INSERT INTO orders (customer_id) VALUES (7)").unwrap();
        assert!(needs_surrogate_key(&mutation, &orders()));

        let result = reconcile(&mutation, &orders(), None);

        assert!(result.ok);
        assert_eq!(result.injected_primary_key, Some(1));
        assert_eq!(
            result.corrected_statement.as_deref(),
            Some("INSERT INTO orders (customer_id, id) VALUES (7, 1)")
        );
    }

    #[test]
    fn injects_next_key_after_existing_max() {
        let mutation = classify("INSERT INTO orders (customer_id) VALUES (7)").unwrap();
        let result = reconcile(&mutation, &orders(), Some(41));

        assert_eq!(result.injected_primary_key, Some(42));
        assert!(result.mutation.assigns("id"));
    }

    #[test]
    fn key_at_i64_max_is_not_reused() {
        let mutation = classify("INSERT INTO orders (customer_id) VALUES (7)").unwrap();
        let result = reconcile(&mutation, &orders(), Some(i64::MAX));

        assert!(!result.ok);
        assert_eq!(result.injected_primary_key, None);
        assert_eq!(result.corrected_statement, None);
        assert_eq!(result.exhausted_key.as_deref(), Some("id"));

        let err = result.error().unwrap();
        assert_eq!(err.kind(), refaudit_core::ErrorKind::ExecutionFailure);
        assert_eq!(err.attempted_statement(), Some("INSERT INTO orders (customer_id) VALUES (7)"));
    }

    #[test]
    fn explicit_key_is_left_alone() {
        let mutation = classify("INSERT INTO orders (ID, customer_id) VALUES (9, 7)").unwrap();
        assert!(!needs_surrogate_key(&mutation, &orders()));

        let result = reconcile(&mutation, &orders(), Some(100));
        assert_eq!(result.injected_primary_key, None);
        assert_eq!(
            result.corrected_statement.as_deref(),
            Some("INSERT INTO orders (ID, customer_id) VALUES (9, 7)")
        );
    }

    #[test]
    fn composite_key_gets_no_injection() {
        let shape = TableShape::new(
            "order_lines",
            vec![
                ColumnMeta::new("order_lines", "order_id", "integer"),
                ColumnMeta::new("order_lines", "line_no", "integer"),
            ],
            vec!["order_id".into(), "line_no".into()],
        );
        let mutation = classify("INSERT INTO order_lines (order_id, line_no) VALUES (1, 1)").unwrap();

        let result = reconcile(&mutation, &shape, None);
        assert!(result.ok);
        assert_eq!(result.injected_primary_key, None);
    }

    #[test]
    fn unknown_columns_fail_reconciliation() {
        let mutation = classify("INSERT INTO orders (customer_id, colour, Size) VALUES (1, 'red', 3)").unwrap();
        let result = reconcile(&mutation, &orders(), Some(3));

        assert!(!result.ok);
        assert_eq!(
            result.missing_columns.iter().cloned().collect::<Vec<_>>(),
            vec!["Size".to_string(), "colour".to_string()]
        );
        assert_eq!(result.corrected_statement, None);
        assert_eq!(result.bound, None);
        assert_eq!(
            result.error().map(|e| e.to_string()).as_deref(),
            Some("The following columns do not exist in table orders: Size, colour")
        );
    }

    #[test]
    fn bound_form_casts_through_declared_types() {
        let mutation = classify("INSERT INTO orders (customer_id, note) VALUES (7, NULL)").unwrap();
        let result = reconcile(&mutation, &orders(), Some(1));
        let bound = result.bound.unwrap();

        assert_eq!(
            bound.sql,
            r#"INSERT INTO "orders" ("customer_id", "note", "id") VALUES ($1::text::integer, $2::text::text, $3::text::integer)"#
        );
        assert_eq!(bound.params, vec![Some("7".into()), None, Some("2".into())]);
        assert_eq!(bound.operation, Operation::Insert);
    }

    #[test]
    fn quote_breaking_text_is_flagged() {
        let mutation = classify("INSERT INTO orders (note) VALUES ('x''); DROP TABLE orders; --')").unwrap();
        let result = reconcile(&mutation, &orders(), None);

        assert!(result.ok);
        assert!(result.injection_risk);
        let bound = result.bound.unwrap();
        assert_eq!(bound.params[0].as_deref(), Some("x'); DROP TABLE orders; --"));
    }

    #[test]
    fn update_and_delete_pass_through() {
        for raw in ["UPDATE orders SET nope = 1 WHERE id = 2", "DELETE FROM orders WHERE id = 2"] {
            let mutation = classify(raw).unwrap();
            let result = reconcile(&mutation, &orders(), Some(10));

            assert!(result.ok, "{raw}");
            assert!(result.corrected_statement.is_none());
            assert!(result.executable(false).is_none());
            assert_eq!(result.mutation, mutation);
        }
    }

    #[test]
    fn executable_picks_requested_form() {
        let mutation = classify("INSERT INTO orders (customer_id) VALUES (7)").unwrap();
        let result = reconcile(&mutation, &orders(), None);

        let literal = result.executable(true).unwrap();
        assert!(!literal.is_bound());
        assert_eq!(literal.sql, "INSERT INTO orders (customer_id, id) VALUES (7, 1)");

        assert!(result.executable(false).unwrap().is_bound());
    }
}
