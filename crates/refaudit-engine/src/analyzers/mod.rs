//! Schema anomaly analyzers
//!
//! Every analyzer is a pure function over a [`SchemaSnapshot`](crate::snapshot::SchemaSnapshot)
//! (plus, for orphan records, the counts read for each key). They hold no
//! state between calls and write progress to the scan's [`ScanLog`](refaudit_core::ScanLog).

pub mod actions;
pub mod false_fk;
pub mod isolated;
pub mod missing_fk;
pub mod orphans;
pub mod structural;

pub use actions::{defined_actions, undefined_actions};
pub use false_fk::false_foreign_keys;
pub use isolated::isolated_tables;
pub use missing_fk::{missing_foreign_keys, potential_foreign_keys, relationships};
pub use orphans::{orphan_records, KeyCounts};
pub use structural::{duplicate_primary_keys, nullability_mismatches, type_mismatches, unindexed_foreign_keys};
