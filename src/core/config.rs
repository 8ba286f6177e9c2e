//! Store configuration
//!
//! Everything that used to be ambient (table name, record shape) is passed in
//! explicitly at construction. Configs can be built in code or read from TOML:
//!
//! ```toml
//! table_name = "tenant_rules"
//! batch_size = 500
//! atomic_save = true
//!
//! [shape]
//! ptype_column = "ptype"
//! field_columns = ["v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7"]
//! ```

use crate::error::{Result, RuleStoreError};
use crate::predicate::Column;
use crate::record::FIELD_COUNT;
use crate::validation::Identifier;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Table used when no name is configured
pub const DEFAULT_TABLE_NAME: &str = "policy_rules";

/// Rows per INSERT statement during bulk writes
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Column layout of the rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordShape {
    /// Policy type column
    pub ptype_column: Identifier,

    /// Field columns, in tuple order
    pub field_columns: [Identifier; FIELD_COUNT],

    /// Declared width of the policy type column
    pub ptype_width: u16,

    /// Declared widths of the field columns
    pub field_widths: [u16; FIELD_COUNT],

    /// Guard the full rule tuple with a unique index
    pub unique_index: bool,
}

impl RecordShape {
    /// Name of `column` in this shape
    ///
    /// # Panics
    ///
    /// If `column` is a field index past the last field column.
    pub fn column_name(&self, column: Column) -> &Identifier {
        match column {
            Column::PolicyType => &self.ptype_column,
            Column::Field(i) => &self.field_columns[i],
        }
    }

    /// Declared width of `column`
    ///
    /// # Panics
    ///
    /// If `column` is a field index past the last field column.
    pub fn column_width(&self, column: Column) -> u16 {
        match column {
            Column::PolicyType => self.ptype_width,
            Column::Field(i) => self.field_widths[i],
        }
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for column in Column::ALL {
            let name = self.column_name(column).as_str().to_ascii_lowercase();
            if name == "id" || !seen.insert(name) {
                return Err(RuleStoreError::InvalidConfig(format!(
                    "column name '{}' is reserved or used twice",
                    self.column_name(column)
                )));
            }
            if self.column_width(column) == 0 {
                return Err(RuleStoreError::InvalidConfig(format!(
                    "column '{}' has zero width",
                    self.column_name(column)
                )));
            }
        }
        Ok(())
    }
}

impl Default for RecordShape {
    fn default() -> Self {
        let field = |i: usize| Identifier::new(format!("v{}", i)).expect("default column names are valid");
        RecordShape {
            ptype_column: Identifier::new("ptype").expect("default column names are valid"),
            field_columns: std::array::from_fn(field),
            ptype_width: 100,
            field_widths: [100, 100, 100, 100, 100, 100, 25, 25],
            unique_index: true,
        }
    }
}

/// Configuration for a [`crate::RuleStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Rule table name
    pub table_name: Identifier,

    /// Column layout
    pub shape: RecordShape,

    /// Rows per insert chunk in `save_policy` and `add_rules`
    ///
    /// A single statement never carries more than `MAX_ROWS_PER_INSERT` rows.
    pub batch_size: usize,

    /// Run drop, recreate and insert of `save_policy` in one transaction
    pub atomic_save: bool,
}

impl StoreConfig {
    /// Default config with a different table name
    ///
    /// An empty name keeps [`DEFAULT_TABLE_NAME`].
    pub fn with_table(table_name: &str) -> Result<Self> {
        if table_name.is_empty() {
            return Ok(StoreConfig::default());
        }
        Ok(StoreConfig {
            table_name: Identifier::new(table_name)?,
            ..Default::default()
        })
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RuleStoreError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        self.shape.validate()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            table_name: Identifier::new(DEFAULT_TABLE_NAME).expect("default table name is valid"),
            shape: RecordShape::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            atomic_save: true,
        }
    }
}
