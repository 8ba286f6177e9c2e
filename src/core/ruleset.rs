//! In-memory rule set
//!
//! A minimal engine-side policy: an ordered, duplicate-free list of rules. It
//! implements both sides of the engine contract and reads/writes the
//! line-oriented policy text format:
//!
//! ```text
//! # comment
//! p, alice, data1, read
//! g, alice, admin
//! ```

use crate::adapter::{RuleSink, RuleSource};
use crate::error::{Result, RuleStoreError};
use crate::record::MAX_TUPLE_LEN;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ruleset {
    rules: Vec<Vec<String>>,
    seen: HashSet<Vec<String>>,
}

impl Ruleset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `rule` unless it is already present; returns whether it was added
    pub fn insert(&mut self, rule: Vec<String>) -> bool {
        if !self.seen.insert(rule.clone()) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn contains<S: AsRef<str>>(&self, rule: &[S]) -> bool {
        let rule: Vec<String> = rule.iter().map(|s| s.as_ref().to_string()).collect();
        self.seen.contains(&rule)
    }

    pub fn rules(&self) -> &[Vec<String>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse the policy text format
    ///
    /// Blank lines and lines starting with `#` are skipped. Values are
    /// comma-separated and trimmed; trailing empty values are dropped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRule` (with the 1-based line number) for a line with
    /// an empty policy type or more than nine values.
    ///
    /// # Examples
    ///
    /// ```
    /// use rulestore_rs::Ruleset;
    ///
    /// let rules = Ruleset::parse("p, alice, data1, read\n\n# roles\ng, alice, admin\n").unwrap();
    /// assert_eq!(rules.len(), 2);
    /// assert!(rules.contains(&["g", "alice", "admin"]));
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut ruleset = Ruleset::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut rule: Vec<String> = line.split(',').map(|v| v.trim().to_string()).collect();
            // Trailing empty values are not stored, so `p, a,` and `p, a` are one rule
            while rule.len() > 1 && rule.last().map_or(false, String::is_empty) {
                rule.pop();
            }
            if rule[0].is_empty() || rule.len() > MAX_TUPLE_LEN {
                return Err(RuleStoreError::InvalidRule(format!(
                    "line {}: expected a policy type and at most {} values",
                    lineno + 1,
                    MAX_TUPLE_LEN - 1
                )));
            }
            ruleset.insert(rule);
        }
        Ok(ruleset)
    }

    /// Render in the policy text format, one rule per line
    pub fn to_text(&self) -> String {
        self.rules
            .iter()
            .map(|rule| format!("{}\n", rule.join(", ")))
            .collect()
    }
}

impl RuleSink for Ruleset {
    fn add_rule(&mut self, rule: Vec<String>) {
        self.insert(rule);
    }
}

impl RuleSource for Ruleset {
    fn range_rules(&self, visitor: &mut dyn FnMut(&[String]) -> bool) {
        self.rules.range_rules(visitor)
    }
}
