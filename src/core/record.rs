//! Rule record: the fixed-arity stored shape of one policy rule
//!
//! The engine hands the store variable-arity tuples such as
//! `["p", "alice", "data1", "read"]`. Storage always has one policy-type column
//! and [`FIELD_COUNT`] field columns. [`RuleRecord`] sits between the two:
//! unset fields are `None` in memory and `''` in the table.

use crate::error::{Result, RuleStoreError};
use serde::{Deserialize, Serialize};

/// Number of field columns (`v0..v7`) after the policy type
pub const FIELD_COUNT: usize = 8;

/// Longest tuple a record can hold: policy type plus every field
pub const MAX_TUPLE_LEN: usize = FIELD_COUNT + 1;

/// One stored policy rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Surrogate key, assigned by the table on insert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Rule category, e.g. `p` for permissions or `g` for role assignments
    pub ptype: String,

    /// Remaining tuple elements; `None` is an unset slot
    pub fields: [Option<String>; FIELD_COUNT],
}

impl RuleRecord {
    /// Record with only the policy type set (every field is a wildcard)
    pub fn new(ptype: impl Into<String>) -> Self {
        RuleRecord {
            ptype: ptype.into(),
            ..Default::default()
        }
    }

    /// Build a record from a full tuple whose first element is the policy type
    ///
    /// # Errors
    ///
    /// Returns `InvalidRule` for an empty tuple or one longer than
    /// [`MAX_TUPLE_LEN`].
    ///
    /// # Examples
    ///
    /// ```
    /// use rulestore_rs::RuleRecord;
    ///
    /// let record = RuleRecord::from_tuple(&["p", "alice", "data1", "read"]).unwrap();
    /// assert_eq!(record.ptype, "p");
    /// assert_eq!(record.field(0), Some("alice"));
    /// assert_eq!(record.field(3), None);
    /// ```
    pub fn from_tuple<S: AsRef<str>>(tuple: &[S]) -> Result<Self> {
        match tuple.split_first() {
            Some((ptype, rule)) => Self::with_policy_type(ptype.as_ref(), rule),
            None => Err(RuleStoreError::InvalidRule(
                "rule tuple must contain at least the policy type".to_string(),
            )),
        }
    }

    /// Build a record from a policy type and a rule that excludes it
    pub fn with_policy_type<S: AsRef<str>>(ptype: &str, rule: &[S]) -> Result<Self> {
        if rule.len() > FIELD_COUNT {
            return Err(RuleStoreError::InvalidRule(format!(
                "rule has {} fields, at most {} are supported",
                rule.len(),
                FIELD_COUNT
            )));
        }

        let mut record = RuleRecord::new(ptype);
        for (slot, value) in record.fields.iter_mut().zip(rule) {
            *slot = non_empty(value.as_ref());
        }
        Ok(record)
    }

    /// The tuple form: policy type followed by fields, trailing unset fields dropped
    ///
    /// Unset fields in the middle of the tuple come back as empty strings.
    pub fn to_tuple(&self) -> Vec<String> {
        let len = self
            .fields
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);

        let mut tuple = Vec::with_capacity(len + 1);
        tuple.push(self.ptype.clone());
        tuple.extend(
            self.fields[..len]
                .iter()
                .map(|f| f.clone().unwrap_or_default()),
        );
        tuple
    }

    /// Value of field column `index`, if set
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).and_then(|f| f.as_deref())
    }

    /// Set field column `index`; an empty value clears the slot
    ///
    /// Indexes past the last column are ignored.
    pub fn set_field(&mut self, index: usize, value: &str) {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = non_empty(value);
        }
    }

    /// Number of set fields (the policy type is not counted)
    pub fn constrained_fields(&self) -> usize {
        self.fields.iter().filter(|f| f.is_some()).count()
    }

    /// Storage form of every field: `''` for unset slots
    pub(crate) fn storage_fields(&self) -> [&str; FIELD_COUNT] {
        let mut out = [""; FIELD_COUNT];
        for (dst, src) in out.iter_mut().zip(&self.fields) {
            *dst = src.as_deref().unwrap_or("");
        }
        out
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tuple_assigns_columns() {
        let record = RuleRecord::from_tuple(&["g", "alice", "admin"]).unwrap();
        assert_eq!(record.ptype, "g");
        assert_eq!(record.field(0), Some("alice"));
        assert_eq!(record.field(1), Some("admin"));
        assert!(record.fields[2..].iter().all(Option::is_none));
        assert_eq!(record.id, None);
    }

    #[test]
    fn test_to_tuple_drops_only_trailing_empties() {
        let mut record = RuleRecord::new("p");
        record.set_field(0, "alice");
        record.set_field(2, "read");

        assert_eq!(record.to_tuple(), vec!["p", "alice", "", "read"]);
    }

    #[test]
    fn test_to_tuple_keeps_policy_type_alone() {
        let record = RuleRecord::new("p");
        assert_eq!(record.to_tuple(), vec!["p"]);
    }

    #[test]
    fn test_full_width_tuple() {
        let tuple: Vec<String> = (0..MAX_TUPLE_LEN).map(|i| format!("c{}", i)).collect();
        let record = RuleRecord::from_tuple(&tuple).unwrap();
        assert_eq!(record.constrained_fields(), FIELD_COUNT);
        assert_eq!(record.to_tuple(), tuple);
    }

    #[test]
    fn test_rejects_bad_tuples() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            RuleRecord::from_tuple(&empty),
            Err(RuleStoreError::InvalidRule(_))
        ));

        let too_long = vec!["x"; MAX_TUPLE_LEN + 1];
        assert!(matches!(
            RuleRecord::from_tuple(&too_long),
            Err(RuleStoreError::InvalidRule(_))
        ));
    }

    #[test]
    fn test_empty_input_field_is_unset() {
        let record = RuleRecord::from_tuple(&["p", "alice", "", ""]).unwrap();
        assert_eq!(record.constrained_fields(), 1);
        assert_eq!(record.to_tuple(), vec!["p", "alice"]);
    }

    #[test]
    fn test_storage_fields() {
        let record = RuleRecord::from_tuple(&["p", "alice", "", "read"]).unwrap();
        assert_eq!(
            record.storage_fields(),
            ["alice", "", "read", "", "", "", "", ""]
        );
    }

    #[test]
    fn test_set_field_out_of_range_is_ignored() {
        let mut record = RuleRecord::new("p");
        record.set_field(FIELD_COUNT, "nope");
        assert_eq!(record, RuleRecord::new("p"));
    }
}
