//! Rule encoding: fixed-width rows and content-derived identity.
//!
//! A policy rule is a ptype tag plus up to six positional values. Rows always
//! carry all six value columns; unused slots hold the empty string. The row
//! primary key is derived from the rule content so that re-inserting the same
//! rule is a no-op.

use serde::Serialize;

use crate::error::{Result, StoreError};

/// Number of value columns (`v0`..`v5`) in a stored rule.
pub const MAX_FIELDS: usize = 6;

/// Column names for the value slots, in slot order.
pub const FIELD_COLUMNS: [&str; MAX_FIELDS] = ["v0", "v1", "v2", "v3", "v4", "v5"];

/// Delimiter used when rebuilding a policy line from a row.
pub const LINE_DELIMITER: &str = ", ";

/// Digest bytes kept for the identity (128 bits, 32 hex chars).
const ID_BYTES: usize = 16;

/// One stored policy rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PolicyRule {
    /// Content-derived primary key
    pub id: String,
    /// Policy type tag ("p", "g", "g2", ...)
    pub ptype: String,
    /// Slot values `v0`..`v5`, empty string when absent
    pub values: [String; MAX_FIELDS],
}

impl PolicyRule {
    /// Encodes `values` into a fixed-width rule and computes its identity.
    ///
    /// Missing trailing slots are padded with the empty string. Rules with
    /// more than [`MAX_FIELDS`] values are rejected.
    pub fn new<S: AsRef<str>>(ptype: &str, values: &[S]) -> Result<Self> {
        if values.len() > MAX_FIELDS {
            return Err(StoreError::RuleTooWide {
                ptype: ptype.to_string(),
                len: values.len(),
                max: MAX_FIELDS,
            });
        }

        let mut slots: [String; MAX_FIELDS] = Default::default();
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = value.as_ref().to_string();
        }

        Ok(Self {
            id: policy_id(ptype, values),
            ptype: ptype.to_string(),
            values: slots,
        })
    }

    /// Rebuilds a rule from stored columns without recomputing the id.
    pub(crate) fn from_parts(id: String, ptype: String, values: [String; MAX_FIELDS]) -> Self {
        Self { id, ptype, values }
    }

    /// Rebuilds the textual policy line: ptype followed by every non-empty
    /// slot, joined by [`LINE_DELIMITER`].
    ///
    /// Empty slots are skipped wherever they occur, so a gap before a
    /// non-empty slot shifts that value left in the produced line.
    pub fn to_line(&self) -> String {
        let capacity = self.ptype.len()
            + self
                .values
                .iter()
                .map(|v| v.len() + LINE_DELIMITER.len())
                .sum::<usize>();

        let mut line = String::with_capacity(capacity);
        line.push_str(&self.ptype);
        for value in self.values.iter().filter(|v| !v.is_empty()) {
            line.push_str(LINE_DELIMITER);
            line.push_str(value);
        }
        line
    }

    /// Non-empty slot values in slot order.
    pub fn field_values(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|v| !v.is_empty())
            .cloned()
            .collect()
    }
}

/// Computes the canonical identity for a rule.
///
/// The digest input is the ptype and every value up to the last non-empty
/// one, joined by `,`. Trailing empty values do not change the id, so it
/// depends only on the padded row. Collisions are not handled.
pub fn policy_id<S: AsRef<str>>(ptype: &str, values: &[S]) -> String {
    let len = values
        .iter()
        .rposition(|v| !v.as_ref().is_empty())
        .map_or(0, |last| last + 1);

    let mut hasher = blake3::Hasher::new();
    hasher.update(ptype.as_bytes());
    for value in &values[..len] {
        hasher.update(b",");
        hasher.update(value.as_ref().as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest.as_bytes()[..ID_BYTES])
}
