//! Policy adapter: the storage contract a policy engine expects.
//!
//! Full and filtered loads into a model, save by replacement, and the
//! incremental add / remove / update operations used for auto-save.
//!
//! # Filtered Loads
//! `is_filtered()` reports the outcome of the most recent load. A filtered
//! load only pushes the `p` and `g` rows selected by the filter; saving a
//! model populated that way drops every rule that was not loaded.

use crate::error::{Result, StoreError};
use crate::filter::{Filter, Predicate};
use crate::model::PolicyModel;
use crate::rule::PolicyRule;
use crate::storage::{RuleTable, StorageStats, StoreConfig};
use log::info;

// ================================================================================================
// ADAPTER INTERFACE
// ================================================================================================

/// Storage operations consumed by a policy engine.
pub trait PolicyAdapter {
    /// Loads every stored rule into `model`.
    fn load_policy(&mut self, model: &mut dyn PolicyModel) -> Result<()>;

    /// Loads the rules selected by `filter`; `None` is a full load.
    fn load_filtered_policy(
        &mut self,
        model: &mut dyn PolicyModel,
        filter: Option<&Filter>,
    ) -> Result<()>;

    /// Whether the most recent load was filtered.
    fn is_filtered(&self) -> bool;

    /// Replaces the stored rules with the rules held by `model`.
    fn save_policy(&mut self, model: &dyn PolicyModel) -> Result<()>;

    fn add_policy(&mut self, ptype: &str, rule: &[String]) -> Result<()>;

    fn add_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<()>;

    fn remove_policy(&mut self, ptype: &str, rule: &[String]) -> Result<()>;

    fn remove_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<()>;

    /// Removes every rule of `ptype` whose values match `field_values`,
    /// aligned to slot `field_index`. Empty values match anything.
    fn remove_filtered_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()>;

    fn update_policy(&mut self, ptype: &str, old_rule: &[String], new_rule: &[String])
        -> Result<()>;

    /// Pairwise update; `old_rules` and `new_rules` must have equal length.
    fn update_policies(
        &mut self,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<()>;

    /// Replaces the rules matching the filter with `new_rules` and returns
    /// the rules that were removed.
    fn update_filtered_policies(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
        new_rules: &[Vec<String>],
    ) -> Result<Vec<Vec<String>>>;
}

// ================================================================================================
// SQLITE ADAPTER
// ================================================================================================

/// [`PolicyAdapter`] over a single SQLite rule table.
#[derive(Debug)]
pub struct SqlAdapter {
    /// Backing rule table
    table: RuleTable,
    /// Outcome of the most recent load
    filtered: bool,
}

impl SqlAdapter {
    /// Opens the store described by `config`.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        Ok(Self::from_table(RuleTable::open(config)?))
    }

    pub fn from_table(table: RuleTable) -> Self {
        Self {
            table,
            filtered: false,
        }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn stats(&self) -> Result<StorageStats> {
        self.table.stats()
    }

    /// Filtered load from a dynamically shaped filter.
    ///
    /// `null` performs a full load. Any value other than an object with
    /// optional `p` / `g` string arrays fails with
    /// [`StoreError::InvalidFilter`] before the store is queried.
    pub fn load_filtered_policy_value(
        &mut self,
        model: &mut dyn PolicyModel,
        filter: &serde_json::Value,
    ) -> Result<()> {
        if filter.is_null() {
            return self.load_policy(model);
        }
        let filter = Filter::try_from(filter.clone())?;
        self.load_filtered_policy(model, Some(&filter))
    }

    /// Releases the database connection.
    pub fn close(self) -> Result<()> {
        self.table.close()
    }
}

impl PolicyAdapter for SqlAdapter {
    fn load_policy(&mut self, model: &mut dyn PolicyModel) -> Result<()> {
        let rules = self.table.select(None)?;
        push_rules(model, &rules);
        self.filtered = false;

        info!("Loaded {} policy rules", rules.len());
        Ok(())
    }

    fn load_filtered_policy(
        &mut self,
        model: &mut dyn PolicyModel,
        filter: Option<&Filter>,
    ) -> Result<()> {
        let Some(filter) = filter else {
            return self.load_policy(model);
        };

        // Translate every category before touching the store.
        let predicates = filter
            .categories()
            .map(|(ptype, pattern)| Predicate::for_fields(ptype, 0, pattern))
            .collect::<Result<Vec<_>>>()?;

        let mut loaded = 0;
        for predicate in &predicates {
            let rules = self.table.select(Some(predicate))?;
            push_rules(model, &rules);
            loaded += rules.len();
        }
        self.filtered = true;

        info!(
            "Loaded {} policy rules through {} filter categories",
            loaded,
            predicates.len()
        );
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        self.filtered
    }

    fn save_policy(&mut self, model: &dyn PolicyModel) -> Result<()> {
        let rules = model
            .policy_rules()
            .iter()
            .map(|(ptype, values)| PolicyRule::new(ptype, values))
            .collect::<Result<Vec<_>>>()?;

        let saved = self.table.replace_all(&rules)?;
        info!("Saved {} policy rules", saved);
        Ok(())
    }

    fn add_policy(&mut self, ptype: &str, rule: &[String]) -> Result<()> {
        let rule = PolicyRule::new(ptype, rule)?;
        self.table.insert(std::slice::from_ref(&rule))?;
        Ok(())
    }

    fn add_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        let rules = encode_rules(ptype, rules)?;
        self.table.insert(&rules)?;
        Ok(())
    }

    fn remove_policy(&mut self, ptype: &str, rule: &[String]) -> Result<()> {
        let rule = PolicyRule::new(ptype, rule)?;
        self.table.delete(std::slice::from_ref(&rule))?;
        Ok(())
    }

    fn remove_policies(&mut self, ptype: &str, rules: &[Vec<String>]) -> Result<()> {
        let rules = encode_rules(ptype, rules)?;
        self.table.delete(&rules)?;
        Ok(())
    }

    fn remove_filtered_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<()> {
        let predicate = Predicate::for_fields(ptype, field_index, field_values)?;
        self.table.delete_matching(&predicate)?;
        Ok(())
    }

    fn update_policy(
        &mut self,
        ptype: &str,
        old_rule: &[String],
        new_rule: &[String],
    ) -> Result<()> {
        self.update_policies(ptype, &[old_rule.to_vec()], &[new_rule.to_vec()])
    }

    fn update_policies(
        &mut self,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<()> {
        if old_rules.len() != new_rules.len() {
            return Err(StoreError::UpdateLengthMismatch {
                old: old_rules.len(),
                new: new_rules.len(),
            });
        }

        let old = encode_rules(ptype, old_rules)?;
        let new = encode_rules(ptype, new_rules)?;
        self.table.update_pairs(&old, &new)?;
        Ok(())
    }

    fn update_filtered_policies(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
        new_rules: &[Vec<String>],
    ) -> Result<Vec<Vec<String>>> {
        let predicate = Predicate::for_fields(ptype, field_index, field_values)?;
        let new = encode_rules(ptype, new_rules)?;

        let removed = self.table.replace_matching(&predicate, &new)?;
        Ok(removed.iter().map(PolicyRule::field_values).collect())
    }
}

fn encode_rules(ptype: &str, rules: &[Vec<String>]) -> Result<Vec<PolicyRule>> {
    rules
        .iter()
        .map(|rule| PolicyRule::new(ptype, rule))
        .collect()
}

fn push_rules(model: &mut dyn PolicyModel, rules: &[PolicyRule]) {
    for rule in rules {
        model.load_policy_line(&rule.to_line());
    }
}

// ================================================================================================
// TESTS
// ================================================================================================
