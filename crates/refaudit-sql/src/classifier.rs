//! Statement classifier
//!
//! Recognizes, in priority order (first match wins, keywords case-insensitive):
//!
//! 1. `INSERT INTO <table> (<col, ...>) VALUES (<val, ...>)`
//! 2. `UPDATE <table> SET <col = val, ...> WHERE <predicate>`
//! 3. `DELETE FROM <table> WHERE <predicate>`
//!
//! Anything else is [`ClassifyError::Unrecognized`]. Predicates are kept as
//! text (a trailing `;` is dropped) and never interpreted.

use refaudit_core::{AuditError, Assignment, ClassifiedMutation, SqlLiteral};
use regex::Regex;
use std::sync::LazyLock;
use crate::split::{is_balanced, split_assignment, split_top_level, split_where};

static INSERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*INSERT\s+INTO\s+(\w+)\s*\((.*?)\)\s*VALUES\s*\((.*)\)\s*;?\s*$")
        .expect("insert pattern is valid")
});

static UPDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*UPDATE\s+(\w+)\s+SET\s+(.+)$")
        .expect("update pattern is valid")
});

static DELETE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*DELETE\s+FROM\s+(\w+)\s+WHERE\s+(.+?)\s*;?\s*$")
        .expect("delete pattern is valid")
});

/// Why a statement could not be classified
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("Statement not recognized or not supported for auditing: {0}")]
    Unrecognized(String),

    #[error("Column/value count mismatch: {columns} column(s), {values} value(s)")]
    ArityMismatch { columns: usize, values: usize },
}

impl From<ClassifyError> for AuditError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::Unrecognized(reason) => AuditError::Unrecognized(reason),
            ClassifyError::ArityMismatch { columns, values } => AuditError::ArityMismatch { columns, values },
        }
    }
}

/// Decompose a raw mutation statement
pub fn classify(raw: &str) -> Result<ClassifiedMutation, ClassifyError> {
    if let Some(caps) = INSERT_RE.captures(raw) {
        return classify_insert(&caps[1], &caps[2], &caps[3]);
    }

    if let Some(caps) = UPDATE_RE.captures(raw) {
        // WHERE is located by scanning, so a quoted "where" in a SET value stays put
        let update = split_where(&caps[2]).and_then(|(set_clause, rest)| {
            let rest = rest.trim_end();
            let predicate = rest.strip_suffix(';').unwrap_or(rest).trim_end();
            (!set_clause.is_empty() && !predicate.is_empty()).then_some((set_clause, predicate))
        });
        if let Some((set_clause, predicate)) = update {
            return Ok(ClassifiedMutation::Update {
                table: caps[1].to_string(),
                assignments: parse_assignments(set_clause)?,
                predicate: predicate.to_string(),
            });
        }
    }

    if let Some(caps) = DELETE_RE.captures(raw) {
        return Ok(ClassifiedMutation::Delete {
            table: caps[1].to_string(),
            predicate: caps[2].to_string(),
        });
    }

    tracing::debug!(statement = raw, "statement matched no recognized shape");
    Err(ClassifyError::Unrecognized(
        "expected INSERT INTO .. VALUES (..), UPDATE .. SET .. WHERE .., or DELETE FROM .. WHERE ..".to_string(),
    ))
}

fn classify_insert(table: &str, columns: &str, values: &str) -> Result<ClassifiedMutation, ClassifyError> {
    if !is_balanced(values) {
        return Err(ClassifyError::Unrecognized(
            "only a single parenthesized VALUES list is supported".to_string(),
        ));
    }

    let columns = split_top_level(columns);
    let values = split_top_level(values);

    if columns.len() != values.len() {
        return Err(ClassifyError::ArityMismatch {
            columns: columns.len(),
            values: values.len(),
        });
    }

    let assignments = columns
        .iter()
        .zip(values.iter())
        .map(|(column, value)| {
            let column = clean_identifier(column)?;
            Ok(Assignment::new(column, SqlLiteral::from_token(value)))
        })
        .collect::<Result<Vec<_>, ClassifyError>>()?;

    Ok(ClassifiedMutation::Insert {
        table: table.to_string(),
        assignments,
    })
}

fn parse_assignments(set_clause: &str) -> Result<Vec<Assignment>, ClassifyError> {
    split_top_level(set_clause)
        .iter()
        .map(|item| {
            let (column, value) = split_assignment(item).ok_or_else(|| {
                ClassifyError::Unrecognized(format!("SET item '{}' has no '='", item))
            })?;
            Ok(Assignment::new(clean_identifier(column)?, SqlLiteral::from_token(value)))
        })
        .collect()
}

/// Strip identifier quoting (`"x"`, `[x]`, `` `x` ``) and reject blanks
fn clean_identifier(raw: &str) -> Result<String, ClassifyError> {
    let name = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .trim();

    if name.is_empty() {
        return Err(ClassifyError::Unrecognized("empty column name".to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use refaudit_core::Operation;

    #[test]
    fn insert_pairs_columns_and_values() {
        let mutation = classify("INSERT INTO orders (customer_id, note) VALUES (7, 'first, order')").unwrap();

        assert_eq!(
            mutation,
            ClassifiedMutation::Insert {
                table: "orders".into(),
                assignments: vec![
                    Assignment::new("customer_id", SqlLiteral::Number("7".into())),
                    Assignment::new("note", SqlLiteral::Text("first, order".into())),
                ],
            }
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let mutation = classify("insert into Orders (id) values (1);").unwrap();
        assert_eq!(mutation.operation(), Operation::Insert);
        assert_eq!(mutation.table(), "Orders");
    }

    #[test]
    fn insert_arity_mismatch() {
        let err = classify("INSERT INTO orders (a, b) VALUES (1)").unwrap_err();
        assert_eq!(err, ClassifyError::ArityMismatch { columns: 2, values: 1 });
    }

    #[test]
    fn multi_row_insert_is_unrecognized() {
        let err = classify("INSERT INTO orders (a) VALUES (1), (2)").unwrap_err();
        assert!(matches!(err, ClassifyError::Unrecognized(_)));
    }

    #[test]
    fn update_keeps_predicate_verbatim() {
        let mutation = classify("UPDATE products SET price = 9.5, name = 'Desk' WHERE id = 3 AND sku <> 'x'").unwrap();

        assert_eq!(mutation.operation(), Operation::Update);
        assert_eq!(mutation.predicate(), Some("id = 3 AND sku <> 'x'"));
        assert_eq!(
            mutation.assignments(),
            &[
                Assignment::new("price", SqlLiteral::Number("9.5".into())),
                Assignment::new("name", SqlLiteral::Text("Desk".into())),
            ]
        );
    }

    #[test]
    fn update_assignment_splits_on_first_equals() {
        let mutation = classify("UPDATE t SET expr = 'a=b' WHERE id = 1").unwrap();
        assert_eq!(mutation.assignments()[0].value, SqlLiteral::Text("a=b".into()));
    }

    #[test]
    fn quoted_where_in_set_value_is_not_the_predicate() {
        let mutation = classify("UPDATE orders SET note = 'ship where possible' WHERE id = 1;").unwrap();

        assert_eq!(
            mutation,
            ClassifiedMutation::Update {
                table: "orders".into(),
                assignments: vec![Assignment::new("note", SqlLiteral::Text("ship where possible".into()))],
                predicate: "id = 1".into(),
            }
        );
    }

    #[test]
    fn update_without_equals_is_unrecognized() {
        let err = classify("UPDATE t SET broken WHERE id = 1").unwrap_err();
        assert!(matches!(err, ClassifyError::Unrecognized(_)));
    }

    #[test]
    fn delete_requires_predicate() {
        let mutation = classify("DELETE FROM customers WHERE id IN (1, 2)").unwrap();
        assert_eq!(mutation.predicate(), Some("id IN (1, 2)"));

        assert!(classify("DELETE FROM customers").is_err());
        assert!(classify("UPDATE customers SET a = 1").is_err());
    }

    #[test]
    fn other_statements_are_unrecognized() {
        for raw in ["SELECT * FROM orders", "DROP TABLE orders", "", "MERGE INTO t USING s ON 1=1"] {
            assert!(matches!(classify(raw), Err(ClassifyError::Unrecognized(_))), "{raw}");
        }
    }

    #[test]
    fn quoted_identifiers_are_unwrapped() {
        let mutation = classify(r#"INSERT INTO orders ("customer_id", [note]) VALUES (1, NULL)"#).unwrap();
        let names: Vec<&str> = mutation.assignments().iter().map(|a| a.column.as_str()).collect();
        assert_eq!(names, vec!["customer_id", "note"]);
        assert_eq!(mutation.assignments()[1].value, SqlLiteral::Null);
    }

    #[test]
    fn classify_errors_map_to_taxonomy() {
        let err: AuditError = ClassifyError::ArityMismatch { columns: 1, values: 2 }.into();
        assert_eq!(err.kind(), refaudit_core::ErrorKind::ArityMismatch);
    }
}
