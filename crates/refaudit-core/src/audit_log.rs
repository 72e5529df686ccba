//! Audit log rows and change-capture triggers
//!
//! The audit log is written by triggers inside the audited database. The
//! engine only creates the table, provisions triggers and reads rows back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::mutation::Operation;

/// Default name of the append-only audit log table
pub const DEFAULT_AUDIT_LOG_TABLE: &str = "audit_log";

/// One row of the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,

    /// Audited table
    pub table: String,

    /// `INSERT`, `UPDATE` or `DELETE`
    pub operation: String,

    /// Database user that ran the statement
    pub user: String,

    pub timestamp: DateTime<Utc>,

    /// Row image(s) captured by the trigger
    pub payload: serde_json::Value,
}

impl AuditLogEntry {
    /// Interpret a stored payload: JSON when it parses, the raw text otherwise.
    ///
    /// Update payloads are `<before> -> <after>` and stay as text.
    pub fn parse_payload(raw: Option<&str>) -> serde_json::Value {
        match raw {
            None => serde_json::Value::Null,
            Some(text) => serde_json::from_str(text)
                .unwrap_or_else(|_| serde_json::Value::String(text.to_string())),
        }
    }
}

/// Filter for listing audit log rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditLogFilter {
    pub table: Option<String>,
    pub operation: Option<Operation>,

    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,

    /// Exclusive upper bound
    pub until: Option<DateTime<Utc>>,

    /// Maximum rows, newest first
    pub limit: Option<i64>,
}

impl AuditLogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-memory equivalent of the filter's WHERE clause
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(table) = &self.table {
            if !entry.table.eq_ignore_ascii_case(table) {
                return false;
            }
        }
        if let Some(op) = self.operation {
            if !entry.operation.eq_ignore_ascii_case(op.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp >= until {
                return false;
            }
        }
        true
    }
}

/// A change-capture trigger for one table and operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditTrigger {
    pub table: String,
    pub operation: Operation,

    /// Table the trigger appends to
    pub log_table: String,
}

impl AuditTrigger {
    pub fn new(table: impl Into<String>, operation: Operation, log_table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operation,
            log_table: log_table.into(),
        }
    }

    /// Well-known trigger name: `tr_<table>_<operation>`
    pub fn name(&self) -> String {
        format!("tr_{}_{}", self.table, self.operation.trigger_suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(table: &str, op: &str, hour: u32) -> AuditLogEntry {
        AuditLogEntry {
            id: 1,
            table: table.to_string(),
            operation: op.to_string(),
            user: "app".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn trigger_names_follow_convention() {
        let trigger = AuditTrigger::new("orders", Operation::Update, DEFAULT_AUDIT_LOG_TABLE);
        assert_eq!(trigger.name(), "tr_orders_update");
    }

    #[test]
    fn payload_parsing_falls_back_to_text() {
        let json = AuditLogEntry::parse_payload(Some(r#"[{"id":1}]"#));
        assert!(json.is_array());

        let text = AuditLogEntry::parse_payload(Some(r#"[{"id":1}] -> [{"id":2}]"#));
        assert_eq!(text, serde_json::Value::String(r#"[{"id":1}] -> [{"id":2}]"#.to_string()));

        assert_eq!(AuditLogEntry::parse_payload(None), serde_json::Value::Null);
    }

    #[test]
    fn filter_matching() {
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let filter = AuditLogFilter::new()
            .table("orders")
            .operation(Operation::Insert)
            .since(since);

        assert!(filter.matches(&entry("orders", "INSERT", 10)));
        assert!(!filter.matches(&entry("orders", "INSERT", 9)));
        assert!(!filter.matches(&entry("orders", "DELETE", 11)));
        assert!(!filter.matches(&entry("customers", "INSERT", 11)));
    }
}
