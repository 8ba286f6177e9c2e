//! Read-side rule filter
//!
//! A [`Filter`] lists acceptable values per column. An empty list leaves the
//! column unconstrained. Filters only ever restrict loads; destructive
//! operations use the offset addressing in [`crate::predicate`].

use crate::predicate::Column;
use serde::{Deserialize, Serialize};

/// Acceptable values per column for a filtered load
///
/// # Examples
///
/// ```
/// use rulestore_rs::Filter;
///
/// // Permission rules for alice or bob
/// let filter = Filter::new().ptype(["p"]).field(0, ["alice", "bob"]);
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub ptype: Vec<String>,
    pub v0: Vec<String>,
    pub v1: Vec<String>,
    pub v2: Vec<String>,
    pub v3: Vec<String>,
    pub v4: Vec<String>,
    pub v5: Vec<String>,
    pub v6: Vec<String>,
    pub v7: Vec<String>,
}

impl Filter {
    /// Filter that matches everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the policy type column
    pub fn ptype<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ptype.extend(values.into_iter().map(Into::into));
        self
    }

    /// Restrict field column `index` (0-based, `v0..v7`)
    ///
    /// Indexes past the last field column are ignored.
    pub fn field<I, S>(mut self, index: usize, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(slot) = self.field_values_mut(index) {
            slot.extend(values.into_iter().map(Into::into));
        }
        self
    }

    /// Acceptable values for `column`
    pub fn values(&self, column: Column) -> &[String] {
        match column {
            Column::PolicyType => &self.ptype,
            Column::Field(0) => &self.v0,
            Column::Field(1) => &self.v1,
            Column::Field(2) => &self.v2,
            Column::Field(3) => &self.v3,
            Column::Field(4) => &self.v4,
            Column::Field(5) => &self.v5,
            Column::Field(6) => &self.v6,
            Column::Field(7) => &self.v7,
            Column::Field(_) => &[],
        }
    }

    fn field_values_mut(&mut self, index: usize) -> Option<&mut Vec<String>> {
        let slot = match index {
            0 => &mut self.v0,
            1 => &mut self.v1,
            2 => &mut self.v2,
            3 => &mut self.v3,
            4 => &mut self.v4,
            5 => &mut self.v5,
            6 => &mut self.v6,
            7 => &mut self.v7,
            _ => return None,
        };
        Some(slot)
    }

    /// True if no column is constrained
    pub fn is_empty(&self) -> bool {
        Column::ALL.iter().all(|c| self.values(*c).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_fills_columns() {
        let filter = Filter::new()
            .ptype(["p", "g"])
            .field(0, ["alice"])
            .field(7, ["x"])
            .field(8, ["ignored"]);

        assert_eq!(filter.values(Column::PolicyType), ["p", "g"]);
        assert_eq!(filter.values(Column::Field(0)), ["alice"]);
        assert_eq!(filter.values(Column::Field(7)), ["x"]);
        assert!(filter.values(Column::Field(1)).is_empty());
    }

    #[test]
    fn test_is_empty() {
        assert!(Filter::new().is_empty());
        assert!(!Filter::new().field(3, ["read"]).is_empty());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let filter: Filter = serde_json::from_str(r#"{"ptype": ["p"], "v1": ["data1"]}"#).unwrap();
        assert_eq!(filter.ptype, vec!["p"]);
        assert_eq!(filter.v1, vec!["data1"]);
        assert!(filter.v0.is_empty());
    }
}
