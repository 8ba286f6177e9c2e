//! Predicate builder
//!
//! Turns partial rule records and filters into conjunctive predicates. The
//! output is an abstract tree of [`Condition`]s; rendering to SQL happens in
//! [`crate::sql`], so everything here is pure and dialect-free.
//!
//! Two addressing schemes feed it:
//! - a partial [`RuleRecord`], where every unset field is a wildcard
//! - an offset filter `(field_index, field_values)`, where `field_values[k]`
//!   constrains field column `field_index + k`

use crate::error::{Result, RuleStoreError};
use crate::filter::Filter;
use crate::record::{RuleRecord, FIELD_COUNT};

/// `field_index` sentinel for "match on policy type only"
pub const POLICY_TYPE_ONLY: i32 = -1;

/// A logical rule column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    PolicyType,
    /// Field column `v0..v7`
    Field(usize),
}

impl Column {
    /// Every rule column in table order
    pub const ALL: [Column; FIELD_COUNT + 1] = [
        Column::PolicyType,
        Column::Field(0),
        Column::Field(1),
        Column::Field(2),
        Column::Field(3),
        Column::Field(4),
        Column::Field(5),
        Column::Field(6),
        Column::Field(7),
    ];

    /// Stored value of this column in `record` (`''` for unset fields)
    pub fn value_of<'r>(&self, record: &'r RuleRecord) -> &'r str {
        match self {
            Column::PolicyType => &record.ptype,
            Column::Field(i) => record.field(*i).unwrap_or(""),
        }
    }
}

/// One clause of a conjunctive predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `column = value`
    Eq { column: Column, value: String },
    /// `column IN (values...)`
    In { column: Column, values: Vec<String> },
}

impl Condition {
    pub fn column(&self) -> Column {
        match self {
            Condition::Eq { column, .. } | Condition::In { column, .. } => *column,
        }
    }

    fn matches(&self, record: &RuleRecord) -> bool {
        match self {
            Condition::Eq { column, value } => column.value_of(record) == value,
            Condition::In { column, values } => {
                let actual = column.value_of(record);
                values.iter().any(|v| v == actual)
            }
        }
    }
}

/// Conjunction of conditions; an empty predicate matches every row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Predicate with no conditions
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a condition to the conjunction
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Positional arguments in clause order (`IN` lists expand in place)
    pub fn args(&self) -> Vec<&str> {
        let mut args = Vec::new();
        for condition in &self.conditions {
            match condition {
                Condition::Eq { value, .. } => args.push(value.as_str()),
                Condition::In { values, .. } => args.extend(values.iter().map(String::as_str)),
            }
        }
        args
    }

    /// Evaluate against an in-memory record with storage semantics
    pub fn matches(&self, record: &RuleRecord) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }
}

/// Equality predicate for a (possibly partial) record
///
/// Always constrains the policy type. Each field column is constrained only
/// if the record sets it, so an unset field means "any value" rather than
/// "empty value".
///
/// # Examples
///
/// ```
/// use rulestore_rs::predicate::equality_predicate;
/// use rulestore_rs::RuleRecord;
///
/// let record = RuleRecord::from_tuple(&["p", "alice", "", "read"]).unwrap();
/// let predicate = equality_predicate(&record);
/// assert_eq!(predicate.len(), 3);
/// assert_eq!(predicate.args(), vec!["p", "alice", "read"]);
/// ```
pub fn equality_predicate(record: &RuleRecord) -> Predicate {
    let mut predicate = Predicate::all().and(Condition::Eq {
        column: Column::PolicyType,
        value: record.ptype.clone(),
    });

    for (i, field) in record.fields.iter().enumerate() {
        if let Some(value) = field {
            predicate = predicate.and(Condition::Eq {
                column: Column::Field(i),
                value: value.clone(),
            });
        }
    }

    predicate
}

/// Resolve an offset filter into a partial record
///
/// `field_values[k]` lands in field column `field_index + k`; every other
/// column stays a wildcard. The [`POLICY_TYPE_ONLY`] sentinel is not accepted
/// here: callers handle it before resolving.
///
/// # Errors
///
/// Returns `InvalidFilter` if:
/// - every value is empty, or no values are given (the filter would match
///   every rule of the policy type)
/// - `field_index` is outside `0..8`, or the values run past column 7
///
/// # Examples
///
/// ```
/// use rulestore_rs::predicate::resolve_offset_filter;
///
/// let record = resolve_offset_filter("p", 2, &["x", "y"]).unwrap();
/// assert_eq!(record.field(2), Some("x"));
/// assert_eq!(record.field(3), Some("y"));
/// assert_eq!(record.field(0), None);
///
/// assert!(resolve_offset_filter("p", 2, &["", ""]).is_err());
/// ```
pub fn resolve_offset_filter<S: AsRef<str>>(
    ptype: &str,
    field_index: i32,
    field_values: &[S],
) -> Result<RuleRecord> {
    let start = usize::try_from(field_index)
        .ok()
        .filter(|start| *start < FIELD_COUNT)
        .ok_or_else(|| {
            RuleStoreError::InvalidFilter(format!(
                "field index {} is outside 0..{}",
                field_index, FIELD_COUNT
            ))
        })?;

    if start + field_values.len() > FIELD_COUNT {
        return Err(RuleStoreError::InvalidFilter(format!(
            "{} values starting at field {} run past the last field column",
            field_values.len(),
            start
        )));
    }

    if field_values.iter().all(|v| v.as_ref().is_empty()) {
        return Err(RuleStoreError::InvalidFilter(
            "filter values cannot all be empty".to_string(),
        ));
    }

    let mut record = RuleRecord::new(ptype);
    for (offset, value) in field_values.iter().enumerate() {
        record.set_field(start + offset, value.as_ref());
    }
    Ok(record)
}

/// Membership predicate for a read-side filter
///
/// Emits `column IN (...)` for every column whose value list is non-empty.
pub fn set_predicate(filter: &Filter) -> Predicate {
    Column::ALL
        .iter()
        .filter(|column| !filter.values(**column).is_empty())
        .fold(Predicate::all(), |predicate, column| {
            predicate.and(Condition::In {
                column: *column,
                values: filter.values(*column).to_vec(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_predicate_policy_type_only() {
        let predicate = equality_predicate(&RuleRecord::new("p"));
        assert_eq!(predicate.len(), 1);
        assert_eq!(
            predicate.conditions()[0],
            Condition::Eq {
                column: Column::PolicyType,
                value: "p".to_string()
            }
        );
    }

    #[test]
    fn test_equality_predicate_skips_unset_fields() {
        let record = RuleRecord::from_tuple(&["p", "", "data1", "", "x"]).unwrap();
        let predicate = equality_predicate(&record);

        let columns: Vec<Column> = predicate.conditions().iter().map(Condition::column).collect();
        assert_eq!(
            columns,
            vec![Column::PolicyType, Column::Field(1), Column::Field(3)]
        );
        assert_eq!(predicate.args(), vec!["p", "data1", "x"]);
    }

    #[test]
    fn test_equality_predicate_as_wildcard_pattern() {
        let pattern = RuleRecord::from_tuple(&["p", "alice"]).unwrap();
        let predicate = equality_predicate(&pattern);

        let read = RuleRecord::from_tuple(&["p", "alice", "data1", "read"]).unwrap();
        let other_user = RuleRecord::from_tuple(&["p", "bob", "data1", "read"]).unwrap();
        let other_type = RuleRecord::from_tuple(&["g", "alice", "admin"]).unwrap();

        assert!(predicate.matches(&read));
        assert!(!predicate.matches(&other_user));
        assert!(!predicate.matches(&other_type));
    }

    #[test]
    fn test_resolve_offset_filter_window() {
        let record = resolve_offset_filter("p", 2, &["x", "y"]).unwrap();
        assert_eq!(record.ptype, "p");
        for i in [0, 1, 4, 5, 6, 7] {
            assert_eq!(record.field(i), None, "column {} should be a wildcard", i);
        }
        assert_eq!(record.field(2), Some("x"));
        assert_eq!(record.field(3), Some("y"));
    }

    #[test]
    fn test_resolve_offset_filter_allows_inner_wildcards() {
        let record = resolve_offset_filter("p", 0, &["", "data1"]).unwrap();
        assert_eq!(record.field(0), None);
        assert_eq!(record.field(1), Some("data1"));
    }

    #[test]
    fn test_resolve_offset_filter_rejects_all_wildcards() {
        let none: [&str; 0] = [];
        assert!(matches!(
            resolve_offset_filter("p", 0, &none),
            Err(RuleStoreError::InvalidFilter(_))
        ));
        assert!(matches!(
            resolve_offset_filter("p", 2, &["", ""]),
            Err(RuleStoreError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_resolve_offset_filter_rejects_bad_shape() {
        assert!(resolve_offset_filter("p", POLICY_TYPE_ONLY, &["a"]).is_err());
        assert!(resolve_offset_filter("p", -3, &["a", "b", "c", "d"]).is_err());
        assert!(resolve_offset_filter("p", 8, &["a"]).is_err());
        assert!(resolve_offset_filter("p", 7, &["a", "b"]).is_err());
        assert!(resolve_offset_filter("p", 7, &["a"]).is_ok());
    }

    #[test]
    fn test_set_predicate_omits_empty_columns() {
        let filter = Filter::new().ptype(["p"]).field(1, ["data1", "data2"]);
        let predicate = set_predicate(&filter);

        assert_eq!(predicate.len(), 2);
        assert_eq!(
            predicate.conditions()[1],
            Condition::In {
                column: Column::Field(1),
                values: vec!["data1".to_string(), "data2".to_string()]
            }
        );
        assert_eq!(predicate.args(), vec!["p", "data1", "data2"]);
    }

    #[test]
    fn test_set_predicate_empty_filter_matches_all() {
        let predicate = set_predicate(&Filter::new());
        assert!(predicate.is_empty());
        assert!(predicate.matches(&RuleRecord::new("anything")));
    }

    #[test]
    fn test_out_of_range_field_column_reads_as_unset() {
        let record = RuleRecord::from_tuple(&["p", "alice"]).unwrap();
        let column = Column::Field(FIELD_COUNT);

        assert_eq!(column.value_of(&record), "");
        assert!(Filter::new().field(0, ["alice"]).values(column).is_empty());

        let predicate = Predicate::all().and(Condition::Eq {
            column,
            value: "x".to_string(),
        });
        assert!(!predicate.matches(&record));
    }
}
