//! Destination policy model.
//!
//! The policy engine owns the in-memory rule sets; the store only pushes
//! decoded lines into them on load and reads them back on save.
//! [`MemoryModel`] is a minimal implementation keyed by section and ptype.

use log::warn;
use std::collections::BTreeMap;

/// Sections accepted by [`MemoryModel`], in save order.
pub const SECTIONS: [&str; 2] = ["p", "g"];

/// The interface the store consumes from a policy engine model.
pub trait PolicyModel {
    /// Merges one delimiter-joined policy line (`"p, alice, data1, read"`).
    fn load_policy_line(&mut self, line: &str);

    /// Every `(ptype, values)` rule held by the model, section `p` first and
    /// section `g` second.
    fn policy_rules(&self) -> Vec<(String, Vec<String>)>;
}

/// In-memory rule sets: section → ptype → rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryModel {
    sections: BTreeMap<String, BTreeMap<String, Vec<Vec<String>>>>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every line of `text` as a policy line.
    pub fn from_lines(text: &str) -> Self {
        let mut model = Self::new();
        for line in text.lines() {
            model.load_policy_line(line);
        }
        model
    }

    /// Adds a rule. Returns `false` when it is already present or the ptype
    /// does not belong to a known section.
    pub fn add_policy<S: AsRef<str>>(&mut self, ptype: &str, rule: &[S]) -> bool {
        let Some(sec) = section_of(ptype) else {
            return false;
        };
        let rule: Vec<String> = rule.iter().map(|v| v.as_ref().to_string()).collect();
        let rules = self
            .sections
            .entry(sec.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_default();

        if rules.contains(&rule) {
            return false;
        }
        rules.push(rule);
        true
    }

    /// Removes a rule. Returns `false` when it was not present.
    pub fn remove_policy<S: AsRef<str>>(&mut self, ptype: &str, rule: &[S]) -> bool {
        let Some(rules) = section_of(ptype)
            .and_then(|sec| self.sections.get_mut(sec))
            .and_then(|ptypes| ptypes.get_mut(ptype))
        else {
            return false;
        };

        let before = rules.len();
        rules.retain(|r| !same_rule(r, rule));
        rules.len() != before
    }

    /// Rules stored under `ptype`, in insertion order.
    pub fn get_policy(&self, ptype: &str) -> &[Vec<String>] {
        section_of(ptype)
            .and_then(|sec| self.sections.get(sec))
            .and_then(|ptypes| ptypes.get(ptype))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> bool {
        self.get_policy(ptype)
            .iter()
            .any(|r| same_rule(r, rule))
    }

    /// Total number of rules across all sections.
    pub fn len(&self) -> usize {
        self.sections
            .values()
            .flat_map(|ptypes| ptypes.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.sections.clear();
    }
}

impl PolicyModel for MemoryModel {
    fn load_policy_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        let tokens: Vec<&str> = line.split(',').map(str::trim).collect();
        if tokens.len() < 2 {
            warn!("Ignoring policy line without values: {:?}", line);
            return;
        }

        let ptype = tokens[0];
        if section_of(ptype).is_none() {
            warn!("Ignoring policy line with unknown section: {:?}", line);
            return;
        }
        self.add_policy(ptype, &tokens[1..]);
    }

    fn policy_rules(&self) -> Vec<(String, Vec<String>)> {
        SECTIONS
            .iter()
            .filter_map(|sec| self.sections.get(*sec))
            .flat_map(|ptypes| {
                ptypes.iter().flat_map(|(ptype, rules)| {
                    rules.iter().map(move |rule| (ptype.clone(), rule.clone()))
                })
            })
            .collect()
    }
}

fn same_rule<S: AsRef<str>>(stored: &[String], rule: &[S]) -> bool {
    stored.len() == rule.len() && stored.iter().zip(rule).all(|(a, b)| a == b.as_ref())
}

/// Section key for a ptype: its first character, if that is `p` or `g`.
fn section_of(ptype: &str) -> Option<&'static str> {
    let first = ptype.get(..1)?;
    SECTIONS.iter().copied().find(|sec| *sec == first)
}
