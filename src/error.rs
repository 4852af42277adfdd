//! Error types for the policy store.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Statement or connection failure reported by SQLite.
    #[error("{context}: {source}")]
    Sqlite {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Filter value was not `null` or a `{ "p": [...], "g": [...] }` object.
    #[error("invalid filter type: {0}")]
    InvalidFilter(String),

    /// A non-empty filter value would land past the last value column.
    #[error("filter has more values than expected, should not exceed {max} values (slot {slot})")]
    TooManyFilterValues { slot: usize, max: usize },

    #[error("rule for ptype '{ptype}' has {len} values, at most {max} are supported")]
    RuleTooWide {
        ptype: String,
        len: usize,
        max: usize,
    },

    #[error("update requires matching rule counts: {old} old rules, {new} new rules")]
    UpdateLengthMismatch { old: usize, new: usize },

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Attaches an operation-specific message to raw SQLite errors.
pub(crate) trait SqliteResultExt<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T> SqliteResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|source| StoreError::Sqlite {
            context: context.to_string(),
            source,
        })
    }
}
