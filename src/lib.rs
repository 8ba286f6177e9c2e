//! # Rulestore - Policy Rule Persistence on SQLite
//!
//! `rulestore-rs` stores the rules of an access-control policy engine in a
//! single relational table. Each row holds a policy type (`p`, `g`, ...) and
//! up to eight positional values:
//!
//! - **Full and filtered loads** in insertion order
//! - **Batched, atomic saves** that replace the whole table
//! - **Incremental writes**: add, remove, update and filtered replacement
//! - **Configurable layout**: table name, column names, widths, unique index
//!
//! ## Quick Start
//!
//! ```rust
//! use rulestore_rs::{Filter, Result, RuleStore};
//! use rusqlite::Connection;
//!
//! # fn main() -> Result<()> {
//! let conn = Connection::open_in_memory()?;
//! let mut store = RuleStore::new(&conn)?;
//!
//! store.add_rules(&[
//!     vec!["p", "alice", "data1", "read"],
//!     vec!["p", "bob", "data2", "write"],
//!     vec!["g", "alice", "admin"],
//! ])?;
//!
//! let alice = store.load_filtered(&Filter::new().ptype(["p"]).field(0, ["alice"]))?;
//! assert_eq!(alice, vec![vec!["p", "alice", "data1", "read"]]);
//! assert!(store.is_filtered());
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Layout
//!
//! ```rust
//! use rulestore_rs::{Result, RuleStoreBuilder};
//! use rusqlite::Connection;
//!
//! # fn main() -> Result<()> {
//! let conn = Connection::open_in_memory()?;
//! let store = RuleStoreBuilder::new()
//!     .table_name("tenant_rules")
//!     .batch_size(200)
//!     .build(&conn)?;
//!
//! assert_eq!(store.config().table_name.as_str(), "tenant_rules");
//! # Ok(())
//! # }
//! ```

// Core implementation
pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{error, ruleset, schema, sql, store};

pub use crate::core::{adapter, config, filter, predicate, record, validation};

// Re-export core types that users need
pub use crate::core::{
    adapter::{Adapter, RuleSink, RuleSource},
    config::{RecordShape, StoreConfig, DEFAULT_BATCH_SIZE, DEFAULT_TABLE_NAME},
    error::{Result, RuleStoreError},
    filter::Filter,
    predicate::{Column, Condition, Predicate, POLICY_TYPE_ONLY},
    record::{RuleRecord, FIELD_COUNT},
    ruleset::Ruleset,
    store::RuleStore,
    validation::Identifier,
};

use rusqlite::Connection;
use std::path::PathBuf;
use tracing::debug;

/// Builder for [`RuleStore`] with custom configuration
///
/// Settings are applied on top of the config file (if any), which is applied
/// on top of [`StoreConfig::default`].
///
/// # Examples
///
/// ```rust,no_run
/// use rulestore_rs::{Result, RuleStoreBuilder};
/// use rusqlite::Connection;
///
/// # fn main() -> Result<()> {
/// let conn = Connection::open("rules.db")?;
/// let store = RuleStoreBuilder::new()
///     .config_file("rulestore.toml")
///     .atomic_save(false)
///     .build(&conn)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleStoreBuilder {
    config_file: Option<PathBuf>,
    table_name: Option<String>,
    shape: Option<RecordShape>,
    batch_size: Option<usize>,
    atomic_save: Option<bool>,
}

impl RuleStoreBuilder {
    /// Create a new RuleStoreBuilder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the base configuration from a TOML file
    pub fn config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set the rule table name (validated on build; empty keeps the default)
    pub fn table_name<S: Into<String>>(mut self, name: S) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Set the column layout
    pub fn shape(mut self, shape: RecordShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Set the number of rows per INSERT statement
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Run full saves in a single transaction
    pub fn atomic_save(mut self, atomic: bool) -> Self {
        self.atomic_save = Some(atomic);
        self
    }

    /// Resolve the final configuration without opening a store
    pub fn into_config(self) -> Result<StoreConfig> {
        let mut config = match &self.config_file {
            Some(path) => {
                debug!("Loading store config from {}", path.display());
                StoreConfig::from_file(path)?
            }
            None => StoreConfig::default(),
        };

        if let Some(name) = self.table_name.filter(|name| !name.is_empty()) {
            config.table_name = Identifier::new(name)?;
        }
        if let Some(shape) = self.shape {
            config.shape = shape;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(atomic) = self.atomic_save {
            config.atomic_save = atomic;
        }

        config.validate()?;
        Ok(config)
    }

    /// Build the store, creating the table if needed
    pub fn build(self, conn: &Connection) -> Result<RuleStore<'_>> {
        RuleStore::with_config(conn, self.into_config()?)
    }
}
