//! Property-based tests for rule storage correctness
//!
//! Uses proptest to check the record, predicate and filter invariants against
//! random rules and a real SQLite table.

use proptest::prelude::*;
use rulestore_rs::predicate::{equality_predicate, resolve_offset_filter, set_predicate};
use rulestore_rs::{Filter, RuleRecord, RuleStore, FIELD_COUNT};
use rusqlite::Connection;
use std::collections::HashSet;

/// A tuple with a non-empty policy type and up to eight possibly-empty fields
fn rule_tuple() -> impl Strategy<Value = Vec<String>> {
    (
        "[pg]",
        prop::collection::vec("(|[a-c]{1,2})", 0..=FIELD_COUNT),
    )
        .prop_map(|(ptype, fields)| {
            let mut tuple = vec![ptype];
            tuple.extend(fields);
            tuple
        })
}

fn without_trailing_empties(mut tuple: Vec<String>) -> Vec<String> {
    while tuple.len() > 1 && tuple.last().map_or(false, |v| v.is_empty()) {
        tuple.pop();
    }
    tuple
}

proptest! {
    #[test]
    fn prop_store_round_trip(tuples in prop::collection::vec(rule_tuple(), 0..20)) {
        let conn = Connection::open_in_memory().unwrap();
        let store = RuleStore::new(&conn).unwrap();

        let mut expected = Vec::new();
        let mut seen = HashSet::new();
        for tuple in tuples {
            let stored = without_trailing_empties(tuple.clone());
            if seen.insert(stored.clone()) {
                store.add_rule(&tuple).unwrap();
                expected.push(stored);
            } else {
                prop_assert!(store.add_rule(&tuple).is_err());
            }
        }

        prop_assert_eq!(store.load_all().unwrap(), expected);
    }

    #[test]
    fn prop_equality_predicate_is_minimal(tuple in rule_tuple()) {
        let record = RuleRecord::from_tuple(&tuple).unwrap();
        let predicate = equality_predicate(&record);

        let non_empty = tuple[1..].iter().filter(|v| !v.is_empty()).count();
        prop_assert_eq!(predicate.len(), 1 + non_empty);
        prop_assert_eq!(predicate.args().len(), predicate.len());
        prop_assert!(predicate.matches(&record));
    }

    #[test]
    fn prop_offset_filter_places_values(
        field_index in 0usize..FIELD_COUNT,
        values in prop::collection::vec("(|[a-c])", 1..=FIELD_COUNT),
    ) {
        let fits = field_index + values.len() <= FIELD_COUNT;
        let all_empty = values.iter().all(|v| v.is_empty());
        let resolved = resolve_offset_filter("p", field_index as i32, &values);

        if !fits || all_empty {
            prop_assert!(resolved.is_err());
        } else {
            let record = resolved.unwrap();
            prop_assert_eq!(record.ptype.as_str(), "p");
            for column in 0..FIELD_COUNT {
                let expected = column
                    .checked_sub(field_index)
                    .and_then(|k| values.get(k))
                    .filter(|v| !v.is_empty())
                    .map(String::as_str);
                prop_assert_eq!(record.field(column), expected);
            }
        }
    }

    #[test]
    fn prop_filtered_load_matches_in_memory_filter(
        tuples in prop::collection::vec(rule_tuple(), 0..20),
        ptypes in prop::collection::vec("[pg]", 0..2),
        column in 0usize..3,
        values in prop::collection::vec("[a-c]", 0..3),
    ) {
        let conn = Connection::open_in_memory().unwrap();
        let mut store = RuleStore::new(&conn).unwrap();

        let mut stored = Vec::new();
        for tuple in &tuples {
            if store.add_rule(tuple).is_ok() {
                stored.push(RuleRecord::from_tuple(tuple).unwrap());
            }
        }

        let filter = Filter::new().ptype(ptypes).field(column, values);
        let predicate = set_predicate(&filter);
        let expected: Vec<Vec<String>> = stored
            .iter()
            .filter(|record| predicate.matches(record))
            .map(RuleRecord::to_tuple)
            .collect();

        prop_assert_eq!(store.load_filtered(&filter).unwrap(), expected);
    }
}
