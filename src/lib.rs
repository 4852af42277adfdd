//! # Policy Store
//!
//! SQLite-backed persistence for access-control policy rules.
//!
//! Rules are `(ptype, v0..v5)` tuples stored one per row under a
//! content-derived primary key. The crate implements the storage side of a
//! policy engine: loading rules into the engine's model (optionally through a
//! [`Filter`]), saving the model back, and the incremental add, remove and
//! update operations.
//!
//! ```no_run
//! use policy_store::{MemoryModel, PolicyAdapter, SqlAdapter, StoreConfig};
//!
//! let mut adapter = SqlAdapter::new(&StoreConfig::from_env())?;
//! adapter.add_policy("p", &["alice".into(), "data1".into(), "read".into()])?;
//!
//! let mut model = MemoryModel::new();
//! adapter.load_policy(&mut model)?;
//! # Ok::<(), policy_store::StoreError>(())
//! ```

pub mod adapter;
pub mod error;
pub mod filter;
pub mod model;
pub mod rule;
pub mod storage;

pub use adapter::{PolicyAdapter, SqlAdapter};
pub use error::{Result, StoreError};
pub use filter::{Filter, Predicate};
pub use model::{MemoryModel, PolicyModel};
pub use rule::{policy_id, PolicyRule, MAX_FIELDS};
pub use storage::{RuleTable, StorageStats, StoreConfig};
