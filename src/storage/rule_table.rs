//! SQLite rule table - the persistence gateway.
//!
//! Every mutating operation runs inside a single transaction. A transaction
//! dropped before commit rolls back, so a failing statement never leaves a
//! partial write behind.
//!
//! # Table Layout
//! ```text
//! id TEXT PRIMARY KEY   content-derived identity
//! ptype TEXT            policy type tag
//! v0 .. v5 TEXT         positional values, '' when absent
//! ```

use log::debug;
use rusqlite::{params_from_iter, Connection, Row};
use std::fs;

use super::types::{StorageStats, StoreConfig};
use crate::error::{Result, SqliteResultExt};
use crate::filter::Predicate;
use crate::rule::{PolicyRule, MAX_FIELDS};

/// Column list shared by every SELECT / RETURNING clause.
const COLUMNS: &str = "id, ptype, v0, v1, v2, v3, v4, v5";

/// Upper bound on ids bound into a single `IN (...)` delete.
const DELETE_CHUNK: usize = 500;

/// Rule table backed by an owned SQLite connection.
#[derive(Debug)]
pub struct RuleTable {
    conn: Connection,
    table: String,
}

impl RuleTable {
    /// Opens the database at `config.database_path` and prepares the table.
    ///
    /// The parent directory of a file database is created when missing.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let conn = if config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = config.database_path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            Connection::open(&config.database_path)
        }
        .context("failed to open rule store")?;

        Self::from_connection(conn, config)
    }

    /// Wraps an existing connection. The caller keeps responsibility for the
    /// connection settings; only the table is created (when configured).
    pub fn from_connection(conn: Connection, config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let table = Self {
            conn,
            table: config.table_name.clone(),
        };
        if config.create_table {
            table.ensure_table()?;
        }
        Ok(table)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn ensure_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                ptype TEXT NOT NULL DEFAULT '',
                v0 TEXT NOT NULL DEFAULT '',
                v1 TEXT NOT NULL DEFAULT '',
                v2 TEXT NOT NULL DEFAULT '',
                v3 TEXT NOT NULL DEFAULT '',
                v4 TEXT NOT NULL DEFAULT '',
                v5 TEXT NOT NULL DEFAULT ''
            )",
            self.table
        );
        self.conn
            .execute_batch(&sql)
            .context("failed to create rule table")
    }

    // ============================================================================================
    // QUERIES
    // ============================================================================================

    /// Rows matching `predicate` (all rows for `None`), in insertion order.
    pub fn select(&self, predicate: Option<&Predicate>) -> Result<Vec<PolicyRule>> {
        let (where_sql, params) = match predicate {
            Some(predicate) => {
                let (sql, params) = predicate.to_sql();
                (format!(" WHERE {}", sql), params)
            }
            None => (String::new(), Vec::new()),
        };
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY rowid",
            COLUMNS, self.table, where_sql
        );

        let mut stmt = self.conn.prepare(&sql).context("failed to load rules")?;
        let rules = stmt
            .query_map(params_from_iter(params), read_rule)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .context("failed to load rules")?;

        debug!("Selected {} rules from {}", rules.len(), self.table);
        Ok(rules)
    }

    /// Total and per-ptype row counts.
    pub fn stats(&self) -> Result<StorageStats> {
        let sql = format!(
            "SELECT ptype, COUNT(*) FROM {} GROUP BY ptype ORDER BY ptype",
            self.table
        );
        let mut stmt = self.conn.prepare(&sql).context("failed to read stats")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .context("failed to read stats")?;

        let mut stats = StorageStats::default();
        for (ptype, count) in counts {
            let count = count as usize;
            stats.total_rules += count;
            stats.rules_by_ptype.insert(ptype, count);
        }
        Ok(stats)
    }

    // ============================================================================================
    // MUTATIONS
    // ============================================================================================

    /// Replaces the whole table with `rules` in one transaction.
    ///
    /// Returns the number of rows inserted; duplicate rules count once.
    pub fn replace_all(&mut self, rules: &[PolicyRule]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .context("failed to replace rules")?;

        let cleared = tx
            .execute(&format!("DELETE FROM {}", self.table), [])
            .context("failed to clear rule table")?;
        let inserted = insert_rules(&tx, &self.table, rules).context("failed to replace rules")?;
        tx.commit().context("failed to replace rules")?;

        debug!(
            "Replaced {} rules with {} rules in {}",
            cleared, inserted, self.table
        );
        Ok(inserted)
    }

    /// Inserts `rules`, ignoring rules whose identity already exists.
    ///
    /// Returns the number of rows actually inserted.
    pub fn insert(&mut self, rules: &[PolicyRule]) -> Result<usize> {
        let tx = self.conn.transaction().context("failed to add rules")?;
        let inserted = insert_rules(&tx, &self.table, rules).context("failed to add rules")?;
        tx.commit().context("failed to add rules")?;

        debug!(
            "Inserted {} of {} rules into {}",
            inserted,
            rules.len(),
            self.table
        );
        Ok(inserted)
    }

    /// Deletes the rows whose id equals the identity of each rule.
    pub fn delete(&mut self, rules: &[PolicyRule]) -> Result<usize> {
        if rules.is_empty() {
            return Ok(0);
        }

        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        let tx = self.conn.transaction().context("failed to remove rules")?;
        let mut removed = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM {} WHERE id IN ({})", self.table, placeholders);
            removed += tx
                .execute(&sql, params_from_iter(chunk))
                .context("failed to remove rules")?;
        }
        tx.commit().context("failed to remove rules")?;

        debug!("Removed {} rules from {}", removed, self.table);
        Ok(removed)
    }

    /// Deletes every row matching `predicate` in one statement.
    pub fn delete_matching(&self, predicate: &Predicate) -> Result<usize> {
        let (where_sql, params) = predicate.to_sql();
        let sql = format!("DELETE FROM {} WHERE {}", self.table, where_sql);
        let removed = self
            .conn
            .execute(&sql, params_from_iter(params))
            .context("failed to remove filtered rules")?;

        debug!("Removed {} filtered rules from {}", removed, self.table);
        Ok(removed)
    }

    /// Pairwise update: every row matching `old[i]`'s non-empty fields is
    /// overwritten with `new[i]`, identity included.
    ///
    /// Overwritten rows that end up with the same content collapse into one
    /// row, as does a row that already held `new[i]`. The caller checks that
    /// both slices have the same length.
    pub fn update_pairs(&mut self, old: &[PolicyRule], new: &[PolicyRule]) -> Result<usize> {
        debug_assert_eq!(old.len(), new.len());

        let tx = self.conn.transaction().context("failed to update rules")?;
        let mut updated = 0;
        for (old_rule, new_rule) in old.iter().zip(new) {
            let predicate = Predicate::matching_rule(old_rule);
            let (where_sql, where_params) = predicate.to_sql();
            let sql = format!(
                "UPDATE OR REPLACE {} SET id = ?, ptype = ?, v0 = ?, v1 = ?, v2 = ?, v3 = ?, v4 = ?, v5 = ? WHERE {}",
                self.table, where_sql
            );
            let params = row_params(new_rule).chain(where_params);
            updated += tx
                .execute(&sql, params_from_iter(params))
                .context("failed to update rules")?;
        }
        tx.commit().context("failed to update rules")?;

        debug!("Updated {} rows in {}", updated, self.table);
        Ok(updated)
    }

    /// For each rule in `rules`: delete every row matching `predicate`, then
    /// insert the rule. Returns all deleted rows, in deletion order.
    ///
    /// The predicate does not change between iterations, so rows are usually
    /// only deleted by the first iteration. A rule inserted by one iteration
    /// is deleted again by the next if it matches the predicate.
    pub fn replace_matching(
        &mut self,
        predicate: &Predicate,
        rules: &[PolicyRule],
    ) -> Result<Vec<PolicyRule>> {
        let (where_sql, params) = predicate.to_sql();
        let delete_sql = format!(
            "DELETE FROM {} WHERE {} RETURNING {}",
            self.table, where_sql, COLUMNS
        );

        let tx = self
            .conn
            .transaction()
            .context("failed to update filtered rules")?;
        let mut removed = Vec::new();
        for rule in rules {
            {
                let mut stmt = tx
                    .prepare_cached(&delete_sql)
                    .context("failed to update filtered rules")?;
                let deleted = stmt
                    .query_map(params_from_iter(params.iter()), read_rule)
                    .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                    .context("failed to update filtered rules")?;
                removed.extend(deleted);
            }
            insert_rules(&tx, &self.table, std::slice::from_ref(rule))
                .context("failed to update filtered rules")?;
        }
        tx.commit().context("failed to update filtered rules")?;

        debug!(
            "Replaced {} filtered rows with {} rules in {}",
            removed.len(),
            rules.len(),
            self.table
        );
        Ok(removed)
    }

    /// Closes the connection, reporting any error from SQLite.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("failed to close rule store")
    }
}

/// Inserts rules with identity conflicts ignored; returns rows inserted.
fn insert_rules(conn: &Connection, table: &str, rules: &[PolicyRule]) -> rusqlite::Result<usize> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        table, COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut inserted = 0;
    for rule in rules {
        inserted += stmt.execute(params_from_iter(row_params(rule)))?;
    }
    Ok(inserted)
}

/// Column values of `rule` in [`COLUMNS`] order.
fn row_params(rule: &PolicyRule) -> impl Iterator<Item = &str> {
    [rule.id.as_str(), rule.ptype.as_str()]
        .into_iter()
        .chain(rule.values.iter().map(String::as_str))
}

fn read_rule(row: &Row<'_>) -> rusqlite::Result<PolicyRule> {
    let mut values: [String; MAX_FIELDS] = Default::default();
    for (slot, value) in values.iter_mut().enumerate() {
        *value = row.get(slot + 2)?;
    }
    Ok(PolicyRule::from_parts(row.get(0)?, row.get(1)?, values))
}
