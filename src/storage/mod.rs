//! Relational storage for policy rules.
//!
//! One SQLite table holds every rule. Rows are keyed by a content-derived id,
//! so inserts are idempotent and removal by rule content is a primary-key
//! delete.

pub mod rule_table;
pub mod types;

pub use rule_table::RuleTable;
pub use types::{StorageStats, StoreConfig};
