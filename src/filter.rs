//! Filter translation: wildcard rule patterns to SQL predicates.
//!
//! An empty string at a pattern position is a wildcard. Non-empty positions
//! become `v{slot} = ?` clauses, conjoined with a leading `ptype = ?` clause.
//! Values are always bound as parameters.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, StoreError};
use crate::rule::{PolicyRule, FIELD_COLUMNS, MAX_FIELDS};

/// A conjunction of column equality clauses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<(&'static str, String)>,
}

impl Predicate {
    /// Predicate matching every rule of the given ptype.
    pub fn ptype(ptype: &str) -> Self {
        Self {
            clauses: vec![("ptype", ptype.to_string())],
        }
    }

    /// Builds the predicate for `(ptype, field_index, values)`.
    ///
    /// `values[0]` constrains slot `field_index`, `values[1]` the slot after
    /// it, and so on. Empty values are wildcards and add no clause. A
    /// non-empty value mapped past the last slot fails with
    /// [`StoreError::TooManyFilterValues`].
    pub fn for_fields<S: AsRef<str>>(ptype: &str, field_index: usize, values: &[S]) -> Result<Self> {
        let mut predicate = Self::ptype(ptype);

        for (offset, value) in values.iter().enumerate() {
            let value = value.as_ref();
            if value.is_empty() {
                continue;
            }

            let slot = field_index + offset;
            let column = FIELD_COLUMNS
                .get(slot)
                .copied()
                .ok_or(StoreError::TooManyFilterValues {
                    slot,
                    max: MAX_FIELDS,
                })?;
            predicate.clauses.push((column, value.to_string()));
        }

        Ok(predicate)
    }

    /// Equality predicate on the ptype and every non-empty slot of `rule`.
    ///
    /// Can match more than one row when `rule` leaves slots empty.
    pub fn matching_rule(rule: &PolicyRule) -> Self {
        let mut predicate = Self::ptype(&rule.ptype);
        for (column, value) in FIELD_COLUMNS.into_iter().zip(&rule.values) {
            if !value.is_empty() {
                predicate.clauses.push((column, value.clone()));
            }
        }
        predicate
    }

    /// Renders the `WHERE` body with positional `?` placeholders and the
    /// parameters in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<&str>) {
        let sql = self
            .clauses
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(" AND ");
        let params = self.clauses.iter().map(|(_, value)| value.as_str()).collect();
        (sql, params)
    }

    /// Number of clauses, including the ptype clause.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Load-time filter over the `p` and `g` categories.
///
/// `None` excludes the category from the load. `Some` loads the category,
/// constrained by the non-empty positions of the pattern (aligned to `v0`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    #[serde(default, alias = "P")]
    pub p: Option<Vec<String>>,
    #[serde(default, alias = "G")]
    pub g: Option<Vec<String>>,
}

impl Filter {
    /// Filter constraining only permission rules.
    pub fn policies<S: AsRef<str>>(pattern: &[S]) -> Self {
        Self {
            p: Some(to_owned_pattern(pattern)),
            g: None,
        }
    }

    /// Filter constraining only grouping rules.
    pub fn groupings<S: AsRef<str>>(pattern: &[S]) -> Self {
        Self {
            p: None,
            g: Some(to_owned_pattern(pattern)),
        }
    }

    /// `(ptype, pattern)` pairs for the categories this filter loads.
    pub fn categories(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        [("p", self.p.as_deref()), ("g", self.g.as_deref())]
            .into_iter()
            .filter_map(|(ptype, pattern)| pattern.map(|pattern| (ptype, pattern)))
    }
}

impl TryFrom<serde_json::Value> for Filter {
    type Error = StoreError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(StoreError::InvalidFilter(format!(
                "expected an object with optional \"p\"/\"g\" arrays, got {}",
                value
            )));
        }
        serde_json::from_value(value).map_err(|e| StoreError::InvalidFilter(e.to_string()))
    }
}

impl FromStr for Filter {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(s).map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
        Self::try_from(value)
    }
}

fn to_owned_pattern<S: AsRef<str>>(pattern: &[S]) -> Vec<String> {
    pattern.iter().map(|v| v.as_ref().to_string()).collect()
}
