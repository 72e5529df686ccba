//! Classified mutation statements
//!
//! The recognized grammar is deliberately tiny: insert, update-by-predicate
//! and delete-by-predicate. Predicates are carried as opaque text.

use serde::{Deserialize, Serialize};

/// Mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// All operations, in trigger provisioning order
    pub const ALL: [Operation; 3] = [Operation::Insert, Operation::Update, Operation::Delete];

    /// Upper-case keyword, as stored in the audit log
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Lower-case suffix used in trigger names
    pub fn trigger_suffix(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// A literal value taken from a raw statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SqlLiteral {
    /// Numeric-looking token, kept as written
    Number(String),

    /// Anything else; surrounding quotes removed
    Text(String),

    /// Bare NULL keyword
    Null,
}

impl SqlLiteral {
    /// Interpret a raw value token
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();

        if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
            return Self::Text(token[1..token.len() - 1].replace("''", "'"));
        }

        if token.eq_ignore_ascii_case("null") {
            return Self::Null;
        }

        if looks_numeric(token) {
            Self::Number(token.to_string())
        } else {
            Self::Text(token.to_string())
        }
    }

    /// Numeric literal from an integer
    pub fn integer(value: i64) -> Self {
        Self::Number(value.to_string())
    }

    /// Render for string interpolation: numbers bare, text single-quoted.
    ///
    /// Text is NOT escaped. Callers that execute the result must check
    /// [`SqlLiteral::is_injection_risk`] or use the bound form instead.
    pub fn render(&self) -> String {
        match self {
            Self::Number(n) => n.clone(),
            Self::Text(s) => format!("'{}'", s),
            Self::Null => "NULL".to_string(),
        }
    }

    /// Value as a text bind parameter
    pub fn as_param(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.clone()),
            Self::Text(s) => Some(s.clone()),
            Self::Null => None,
        }
    }

    /// Text that would break out of naive single quoting
    pub fn is_injection_risk(&self) -> bool {
        match self {
            Self::Text(s) => s.contains('\'') || s.contains(';') || s.contains("--"),
            _ => false,
        }
    }
}

impl std::fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Optional sign, digits, at most one decimal point
pub fn looks_numeric(token: &str) -> bool {
    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    if digits.is_empty() {
        return false;
    }

    let mut seen_digit = false;
    let mut seen_dot = false;
    for ch in digits.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

/// `column = value`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: SqlLiteral,
}

impl Assignment {
    pub fn new(column: impl Into<String>, value: SqlLiteral) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// A raw statement decomposed into its shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "UPPERCASE")]
pub enum ClassifiedMutation {
    Insert {
        table: String,
        assignments: Vec<Assignment>,
    },
    Update {
        table: String,
        assignments: Vec<Assignment>,
        predicate: String,
    },
    Delete {
        table: String,
        predicate: String,
    },
}

impl ClassifiedMutation {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Insert { .. } => Operation::Insert,
            Self::Update { .. } => Operation::Update,
            Self::Delete { .. } => Operation::Delete,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => table,
        }
    }

    /// Assignments in statement order (empty for deletes)
    pub fn assignments(&self) -> &[Assignment] {
        match self {
            Self::Insert { assignments, .. } | Self::Update { assignments, .. } => assignments,
            Self::Delete { .. } => &[],
        }
    }

    /// WHERE clause text, verbatim
    pub fn predicate(&self) -> Option<&str> {
        match self {
            Self::Update { predicate, .. } | Self::Delete { predicate, .. } => Some(predicate),
            Self::Insert { .. } => None,
        }
    }

    /// Whether `column` is assigned, ignoring ASCII case
    pub fn assigns(&self, column: &str) -> bool {
        self.assignments().iter().any(|a| a.column.eq_ignore_ascii_case(column))
    }

    /// The values a caller sees in the audit result
    pub fn resolved_values(&self) -> ResolvedValues {
        match self {
            Self::Insert { assignments, .. } | Self::Update { assignments, .. } => {
                ResolvedValues::Assignments(assignments.clone())
            }
            Self::Delete { predicate, .. } => ResolvedValues::Predicate(predicate.clone()),
        }
    }
}

/// Values attached to a mutation audit result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolvedValues {
    Assignments(Vec<Assignment>),
    Predicate(String),
}

/// A statement ready to be sent to the target database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableStatement {
    /// Target table
    pub table: String,

    /// Operation the statement performs
    pub operation: Operation,

    /// SQL text, with `$n` placeholders when `params` is non-empty
    pub sql: String,

    /// Text bind parameters; `None` binds NULL
    pub params: Vec<Option<String>>,
}

impl ExecutableStatement {
    /// A statement with every value inlined
    pub fn literal(table: impl Into<String>, operation: Operation, sql: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operation,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A statement with bind parameters
    pub fn bound(
        table: impl Into<String>,
        operation: Operation,
        sql: impl Into<String>,
        params: Vec<Option<String>>,
    ) -> Self {
        Self {
            table: table.into(),
            operation,
            sql: sql.into(),
            params,
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.params.is_empty()
    }
}
