//! Contract between the store and an authorization engine
//!
//! The engine owns the in-memory policy. It exposes that policy to the store
//! through [`RuleSink`] (rules flowing in on load) and [`RuleSource`] (rules
//! flowing out on save), and drives persistence through [`Adapter`].

use crate::error::Result;
use crate::filter::Filter;

/// Receives rules during a load, once per stored rule, in load order
pub trait RuleSink {
    fn add_rule(&mut self, rule: Vec<String>);
}

/// Exposes every in-memory rule for a full save
pub trait RuleSource {
    /// Call `visitor` for each rule (policy type first) until it returns `false`
    fn range_rules(&self, visitor: &mut dyn FnMut(&[String]) -> bool);
}

impl RuleSink for Vec<Vec<String>> {
    fn add_rule(&mut self, rule: Vec<String>) {
        self.push(rule);
    }
}

impl RuleSource for [Vec<String>] {
    fn range_rules(&self, visitor: &mut dyn FnMut(&[String]) -> bool) {
        for rule in self {
            if !visitor(rule) {
                break;
            }
        }
    }
}

impl RuleSource for Vec<Vec<String>> {
    fn range_rules(&self, visitor: &mut dyn FnMut(&[String]) -> bool) {
        self.as_slice().range_rules(visitor)
    }
}

/// Persistence operations an engine calls on its policy store
///
/// Rules passed to `add_*`, `remove_rule(s)` and `save_policy` start with the
/// policy type. The `update_*` operations take the policy type separately and
/// rules without it.
pub trait Adapter {
    /// Load every stored rule into `sink`
    fn load_policy(&mut self, sink: &mut dyn RuleSink) -> Result<()>;

    /// Load only rules matching `filter`; marks the adapter as filtered
    fn load_filtered_policy(&mut self, sink: &mut dyn RuleSink, filter: &Filter) -> Result<()>;

    /// Replace all stored rules with the rules in `source`
    fn save_policy(&mut self, source: &dyn RuleSource) -> Result<()>;

    fn add_rule(&mut self, rule: &[String]) -> Result<()>;

    fn add_rules(&mut self, rules: &[Vec<String>]) -> Result<()>;

    fn remove_rule(&mut self, rule: &[String]) -> Result<()>;

    fn remove_rules(&mut self, rules: &[Vec<String>]) -> Result<()>;

    /// Remove rules of `ptype` matching the offset filter (`-1`: every rule of `ptype`)
    fn remove_filtered_rules(
        &mut self,
        ptype: &str,
        field_index: i32,
        field_values: &[String],
    ) -> Result<()>;

    fn update_rule(&mut self, ptype: &str, old_rule: &[String], new_rule: &[String]) -> Result<()>;

    fn update_rules(
        &mut self,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<()>;

    /// Replace the rules matching the offset filter with `new_rules`, returning the removed ones
    fn update_filtered_rules(
        &mut self,
        ptype: &str,
        new_rules: &[Vec<String>],
        field_index: i32,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>>;

    /// Whether the last load was filtered (a full save would drop unloaded rules)
    fn is_filtered(&self) -> bool;
}
