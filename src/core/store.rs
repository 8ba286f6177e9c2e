//! SQLite-backed rule store
//!
//! Every write goes straight to the table; the store keeps no copy of the
//! rules. Multi-statement operations run inside a transaction and roll back
//! as a whole on the first error.

use crate::adapter::{Adapter, RuleSink, RuleSource};
use crate::config::StoreConfig;
use crate::error::{Result, RuleStoreError};
use crate::filter::Filter;
use crate::predicate::{
    equality_predicate, resolve_offset_filter, set_predicate, Predicate, POLICY_TYPE_ONLY,
};
use crate::record::RuleRecord;
use crate::schema;
use crate::sql::{self, Table};
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// Rule store over a borrowed SQLite connection
///
/// The connection's owner is responsible for closing it; the store only
/// borrows it for its own lifetime.
///
/// # Examples
///
/// ```
/// use rulestore_rs::{RuleStore, Result};
/// use rusqlite::Connection;
///
/// # fn main() -> Result<()> {
/// let conn = Connection::open_in_memory()?;
/// let store = RuleStore::new(&conn)?;
///
/// store.add_rule(&["p", "alice", "data1", "read"])?;
/// store.add_rule(&["g", "alice", "admin"])?;
///
/// let rules = store.load_all()?;
/// assert_eq!(rules[0], vec!["p", "alice", "data1", "read"]);
/// # Ok(())
/// # }
/// ```
pub struct RuleStore<'conn> {
    conn: &'conn Connection,
    config: StoreConfig,
    is_filtered: bool,
}

impl<'conn> RuleStore<'conn> {
    /// Open a store on the default table, creating it if needed
    pub fn new(conn: &'conn Connection) -> Result<Self> {
        Self::with_config(conn, StoreConfig::default())
    }

    /// Open a store on `table_name` with the default record shape
    pub fn with_table(conn: &'conn Connection, table_name: &str) -> Result<Self> {
        Self::with_config(conn, StoreConfig::with_table(table_name)?)
    }

    /// Open a store with an explicit configuration
    pub fn with_config(conn: &'conn Connection, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let store = RuleStore {
            conn,
            config,
            is_filtered: false,
        };
        schema::ensure_table(conn, &store.table())?;
        info!("Rule store ready on table {}", store.config.table_name);
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether a filtered load has happened on this store
    ///
    /// Once set, the flag stays set for the store's lifetime.
    pub fn is_filtered(&self) -> bool {
        self.is_filtered
    }

    fn table(&self) -> Table<'_> {
        Table {
            name: &self.config.table_name,
            shape: &self.config.shape,
        }
    }

    /// Run `f` in a transaction, committing on success and rolling back on error
    fn transaction<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        match f(&*tx) {
            Ok(value) => {
                tx.commit().map_err(|e| RuleStoreError::Transaction {
                    operation,
                    source: Box::new(e.into()),
                })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback of {} failed: {}", operation, rollback_err);
                }
                debug!("Rolled back {}: {}", operation, err);
                Err(RuleStoreError::Transaction {
                    operation,
                    source: Box::new(err),
                })
            }
        }
    }

    /// Every stored rule in insertion order
    pub fn load_all(&self) -> Result<Vec<Vec<String>>> {
        let records = sql::select_where(self.conn, &self.table(), &Predicate::all())?;
        debug!("Loaded {} rules", records.len());
        Ok(records.iter().map(RuleRecord::to_tuple).collect())
    }

    /// Rules matching `filter` in insertion order; marks the store as filtered
    pub fn load_filtered(&mut self, filter: &Filter) -> Result<Vec<Vec<String>>> {
        let predicate = set_predicate(filter);
        let records = sql::select_where(self.conn, &self.table(), &predicate)?;
        self.is_filtered = true;
        info!(
            "Loaded {} rules with {} filter conditions",
            records.len(),
            predicate.len()
        );
        Ok(records.iter().map(RuleRecord::to_tuple).collect())
    }

    /// Replace the whole table with the rules in `source`
    ///
    /// Drops and recreates the table, then inserts in chunks of
    /// `batch_size`. With `atomic_save` (the default) the sequence runs in
    /// one transaction; without it, a failure part-way leaves the table in
    /// an unspecified state and the save must be repeated.
    pub fn save<S: RuleSource + ?Sized>(&self, source: &S) -> Result<usize> {
        let saved = if self.config.atomic_save {
            self.transaction("save_policy", |conn| self.replace_all(conn, source))?
        } else {
            self.replace_all(self.conn, source)?
        };
        info!("Saved {} rules to {}", saved, self.config.table_name);
        Ok(saved)
    }

    fn replace_all<S: RuleSource + ?Sized>(&self, conn: &Connection, source: &S) -> Result<usize> {
        let table = self.table();
        schema::drop_table(conn, &table)?;
        schema::ensure_table(conn, &table)?;

        let batch_size = self.config.batch_size;
        let mut batch: Vec<RuleRecord> = Vec::with_capacity(batch_size.min(1024));
        let mut saved = 0;
        let mut failure = None;

        source.range_rules(&mut |rule| {
            let record = match RuleRecord::from_tuple(rule) {
                Ok(record) => record,
                Err(e) => {
                    failure = Some(e);
                    return false;
                }
            };
            batch.push(record);

            if batch.len() >= batch_size {
                match sql::insert(conn, &table, &batch) {
                    Ok(n) => saved += n,
                    Err(e) => {
                        failure = Some(e);
                        return false;
                    }
                }
                batch.clear();
            }
            true
        });

        if let Some(err) = failure {
            return Err(err);
        }
        saved += sql::insert(conn, &table, &batch)?;
        Ok(saved)
    }

    /// Insert one rule (policy type first)
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` if the rule is already stored.
    pub fn add_rule<S: AsRef<str>>(&self, rule: &[S]) -> Result<()> {
        let record = RuleRecord::from_tuple(rule)?;
        let id = sql::insert_one(self.conn, &self.table(), &record)?;
        debug!("Added rule {:?} as id {}", record.to_tuple(), id);
        Ok(())
    }

    /// Insert several rules; either all are stored or none
    pub fn add_rules<R: AsRef<[S]>, S: AsRef<str>>(&self, rules: &[R]) -> Result<usize> {
        let records = rules
            .iter()
            .map(|rule| RuleRecord::from_tuple(rule.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let table = self.table();
        let added = self.transaction("add_rules", |conn| {
            let mut added = 0;
            for chunk in records.chunks(self.config.batch_size) {
                added += sql::insert(conn, &table, chunk)?;
            }
            Ok(added)
        })?;
        debug!("Added {} rules", added);
        Ok(added)
    }

    /// Delete rules matching `rule`; unset trailing fields act as wildcards
    pub fn remove_rule<S: AsRef<str>>(&self, rule: &[S]) -> Result<usize> {
        let record = RuleRecord::from_tuple(rule)?;
        sql::delete_where(self.conn, &self.table(), &equality_predicate(&record))
    }

    /// Delete rules matching any of `rules` in one transaction
    pub fn remove_rules<R: AsRef<[S]>, S: AsRef<str>>(&self, rules: &[R]) -> Result<usize> {
        let records = rules
            .iter()
            .map(|rule| RuleRecord::from_tuple(rule.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let table = self.table();
        self.transaction("remove_rules", |conn| {
            let mut removed = 0;
            for record in &records {
                removed += sql::delete_where(conn, &table, &equality_predicate(record))?;
            }
            Ok(removed)
        })
    }

    /// Delete rules of `ptype` matching an offset filter
    ///
    /// `field_index == -1` deletes every rule of `ptype`. Otherwise
    /// `field_values[k]` constrains field column `field_index + k`, and empty
    /// values are wildcards.
    ///
    /// # Errors
    ///
    /// `InvalidFilter` if every value is empty or the filter does not fit the
    /// field columns; nothing is deleted in that case.
    pub fn remove_filtered<S: AsRef<str>>(
        &self,
        ptype: &str,
        field_index: i32,
        field_values: &[S],
    ) -> Result<usize> {
        let pattern = if field_index == POLICY_TYPE_ONLY {
            RuleRecord::new(ptype)
        } else {
            resolve_offset_filter(ptype, field_index, field_values)?
        };

        let removed = sql::delete_where(self.conn, &self.table(), &equality_predicate(&pattern))?;
        debug!("Removed {} rules of type {}", removed, ptype);
        Ok(removed)
    }

    /// Overwrite the rule matching `old_rule` with `new_rule`
    ///
    /// Both rules exclude the policy type. Exactly one stored rule must match.
    ///
    /// # Errors
    ///
    /// `RuleNotFound` if nothing matches, `AmbiguousUpdate` if several rules
    /// match (possible when `old_rule` leaves trailing fields unset).
    pub fn update_rule<S: AsRef<str>, T: AsRef<str>>(
        &self,
        ptype: &str,
        old_rule: &[S],
        new_rule: &[T],
    ) -> Result<()> {
        let old = RuleRecord::with_policy_type(ptype, old_rule)?;
        let new = RuleRecord::with_policy_type(ptype, new_rule)?;
        self.transaction("update_rule", |conn| self.update_exact(conn, &old, &new))
    }

    /// Pairwise `update_rule` in one transaction
    pub fn update_rules<R, S, Q, T>(&self, ptype: &str, old_rules: &[R], new_rules: &[Q]) -> Result<()>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
        Q: AsRef<[T]>,
        T: AsRef<str>,
    {
        if old_rules.len() != new_rules.len() {
            return Err(RuleStoreError::InvalidRule(format!(
                "{} old rules but {} new rules",
                old_rules.len(),
                new_rules.len()
            )));
        }

        let pairs = old_rules
            .iter()
            .zip(new_rules)
            .map(|(old, new)| {
                Ok((
                    RuleRecord::with_policy_type(ptype, old.as_ref())?,
                    RuleRecord::with_policy_type(ptype, new.as_ref())?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.transaction("update_rules", |conn| {
            for (old, new) in &pairs {
                self.update_exact(conn, old, new)?;
            }
            Ok(())
        })
    }

    fn update_exact(&self, conn: &Connection, old: &RuleRecord, new: &RuleRecord) -> Result<()> {
        let table = self.table();
        let predicate = equality_predicate(old);

        let matched = sql::select_where(conn, &table, &predicate)?.len();
        match matched {
            0 => return Err(RuleStoreError::RuleNotFound(old.to_tuple())),
            1 => {}
            _ => {
                return Err(RuleStoreError::AmbiguousUpdate {
                    rule: old.to_tuple(),
                    matched,
                })
            }
        }

        sql::update_where(conn, &table, &predicate, new)?;
        debug!("Updated rule {:?} -> {:?}", old.to_tuple(), new.to_tuple());
        Ok(())
    }

    /// Replace the rules of `ptype` matching an offset filter with `new_rules`
    ///
    /// For each new rule, inside one transaction: select the rules matching
    /// the filter, delete them, insert the new rule. Rules inserted earlier in
    /// the same call are never selected, so the result is every matching rule
    /// that existed before the call, in insertion order. New rules exclude the
    /// policy type; returned rules include it.
    ///
    /// # Errors
    ///
    /// `InvalidFilter` as for [`RuleStore::remove_filtered`] (the `-1`
    /// sentinel is not accepted here). Any failure inside the loop rolls the
    /// whole replacement back.
    pub fn update_filtered<R, S, T>(
        &self,
        ptype: &str,
        new_rules: &[R],
        field_index: i32,
        field_values: &[T],
    ) -> Result<Vec<Vec<String>>>
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let pattern = resolve_offset_filter(ptype, field_index, field_values)?;
        let predicate = equality_predicate(&pattern);
        let new_records = new_rules
            .iter()
            .map(|rule| RuleRecord::with_policy_type(ptype, rule.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let table = self.table();
        let removed = self.transaction("update_filtered_rules", |conn| {
            let mut removed: Vec<RuleRecord> = Vec::new();
            let mut inserted: Vec<i64> = Vec::with_capacity(new_records.len());

            for record in &new_records {
                let stale: Vec<RuleRecord> = sql::select_where(conn, &table, &predicate)?
                    .into_iter()
                    .filter(|r| r.id.map_or(true, |id| !inserted.contains(&id)))
                    .collect();
                let ids: Vec<i64> = stale.iter().filter_map(|r| r.id).collect();
                sql::delete_ids(conn, &table, &ids)?;
                removed.extend(stale);

                inserted.push(sql::insert_one(conn, &table, record)?);
            }
            Ok(removed)
        })?;

        info!(
            "Replaced {} rules of type {} with {} new rules",
            removed.len(),
            ptype,
            new_records.len()
        );
        Ok(removed.iter().map(RuleRecord::to_tuple).collect())
    }
}

impl Adapter for RuleStore<'_> {
    fn load_policy(&mut self, sink: &mut dyn RuleSink) -> Result<()> {
        for rule in self.load_all()? {
            sink.add_rule(rule);
        }
        Ok(())
    }

    fn load_filtered_policy(&mut self, sink: &mut dyn RuleSink, filter: &Filter) -> Result<()> {
        for rule in self.load_filtered(filter)? {
            sink.add_rule(rule);
        }
        Ok(())
    }

    fn save_policy(&mut self, source: &dyn RuleSource) -> Result<()> {
        self.save(source).map(|_| ())
    }

    fn add_rule(&mut self, rule: &[String]) -> Result<()> {
        RuleStore::add_rule(self, rule)
    }

    fn add_rules(&mut self, rules: &[Vec<String>]) -> Result<()> {
        RuleStore::add_rules(self, rules).map(|_| ())
    }

    fn remove_rule(&mut self, rule: &[String]) -> Result<()> {
        RuleStore::remove_rule(self, rule).map(|_| ())
    }

    fn remove_rules(&mut self, rules: &[Vec<String>]) -> Result<()> {
        RuleStore::remove_rules(self, rules).map(|_| ())
    }

    fn remove_filtered_rules(
        &mut self,
        ptype: &str,
        field_index: i32,
        field_values: &[String],
    ) -> Result<()> {
        self.remove_filtered(ptype, field_index, field_values)
            .map(|_| ())
    }

    fn update_rule(&mut self, ptype: &str, old_rule: &[String], new_rule: &[String]) -> Result<()> {
        RuleStore::update_rule(self, ptype, old_rule, new_rule)
    }

    fn update_rules(
        &mut self,
        ptype: &str,
        old_rules: &[Vec<String>],
        new_rules: &[Vec<String>],
    ) -> Result<()> {
        RuleStore::update_rules(self, ptype, old_rules, new_rules)
    }

    fn update_filtered_rules(
        &mut self,
        ptype: &str,
        new_rules: &[Vec<String>],
        field_index: i32,
        field_values: &[String],
    ) -> Result<Vec<Vec<String>>> {
        self.update_filtered(ptype, new_rules, field_index, field_values)
    }

    fn is_filtered(&self) -> bool {
        self.is_filtered
    }
}
