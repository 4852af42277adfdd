//! Storage configuration and statistics.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::error::{Result, StoreError};

/// Environment variable overriding [`StoreConfig::database_path`].
pub const ENV_DATABASE_PATH: &str = "POLICY_STORE_PATH";
/// Environment variable overriding [`StoreConfig::table_name`].
pub const ENV_TABLE_NAME: &str = "POLICY_STORE_TABLE";

/// Default rule table name.
pub const DEFAULT_TABLE: &str = "casbin_rule";

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Configuration for the SQLite rule store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path to the SQLite database file (or `:memory:`)
    pub database_path: PathBuf,
    /// Name of the rule table
    pub table_name: String,
    /// Create the rule table on open when it does not exist
    pub create_table: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./var/data/policy.db"),
            table_name: DEFAULT_TABLE.to_string(),
            create_table: true,
        }
    }
}

impl StoreConfig {
    /// Defaults, overridden by `POLICY_STORE_PATH` and `POLICY_STORE_TABLE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(table) = std::env::var(ENV_TABLE_NAME) {
            config.table_name = table;
        }
        config
    }

    /// In-memory store, mostly useful for tests.
    pub fn in_memory() -> Self {
        Self {
            database_path: PathBuf::from(MEMORY_PATH),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    /// Checks that the table name is a plain SQL identifier. It is
    /// interpolated into statements and cannot be bound as a parameter.
    pub fn validate(&self) -> Result<()> {
        static IDENT: OnceLock<Regex> = OnceLock::new();
        let ident = IDENT.get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
        });

        if !ident.is_match(&self.table_name) {
            return Err(StoreError::InvalidConfig(format!(
                "table name {:?} is not a valid identifier",
                self.table_name
            )));
        }
        Ok(())
    }
}

/// Row counts for the rule table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of stored rules
    pub total_rules: usize,
    /// Number of stored rules per ptype
    pub rules_by_ptype: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.database_path, PathBuf::from("./var/data/policy.db"));
        assert_eq!(config.table_name, "casbin_rule");
        assert!(config.create_table);
        assert!(!config.is_in_memory());
        assert!(StoreConfig::in_memory().is_in_memory());
    }

    #[test]
    fn test_store_config_from_env() {
        // No other test reads these variables.
        std::env::set_var(ENV_DATABASE_PATH, "/tmp/policy-env.db");
        std::env::set_var(ENV_TABLE_NAME, "env_rules");
        let config = StoreConfig::from_env();
        std::env::remove_var(ENV_DATABASE_PATH);
        std::env::remove_var(ENV_TABLE_NAME);

        assert_eq!(config.database_path, PathBuf::from("/tmp/policy-env.db"));
        assert_eq!(config.table_name, "env_rules");
        assert!(config.create_table);
    }

    #[test]
    fn test_validate_table_name() {
        let mut config = StoreConfig::in_memory();
        assert!(config.validate().is_ok());

        for bad in ["", "1rules", "rules; DROP TABLE x", "casbin.rules", "r-1"] {
            config.table_name = bad.to_string();
            assert!(matches!(config.validate(), Err(StoreError::InvalidConfig(_))));
        }
    }
}
