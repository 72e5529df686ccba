//! Mutation statement handling
//!
//! - [`classify`] decomposes a raw insert/update/delete into a [`ClassifiedMutation`]
//! - [`reconcile`] checks an insert against catalog metadata and rebuilds it
//!
//! This is pattern matching over three statement shapes, not a SQL parser.
//! Predicates are never interpreted.
//!
//! [`ClassifiedMutation`]: refaudit_core::ClassifiedMutation

pub mod classifier;
pub mod reconciler;
mod split;

pub use classifier::{classify, ClassifyError};
pub use reconciler::{needs_surrogate_key, reconcile, ReconciliationResult};
