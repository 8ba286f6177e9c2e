//! Validation for SQL identifiers
//!
//! Table and column names are configuration, but they end up formatted into
//! statements (SQLite cannot bind identifiers as parameters). Every name that
//! reaches the `sql` module goes through [`Identifier`] first.

use crate::error::{Result, RuleStoreError};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::OnceLock;

/// A validated SQL identifier
///
/// # Rules
/// - ASCII letters, digits and underscores only
/// - Must not start with a digit
/// - Length: 1-64 characters
///
/// # Examples
///
/// ```
/// use rulestore_rs::validation::Identifier;
///
/// let table = Identifier::new("policy_rules").unwrap();
/// assert_eq!(table.as_str(), "policy_rules");
///
/// assert!(Identifier::new("rules; DROP TABLE x").is_err());
/// assert!(Identifier::new("1rules").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    const PATTERN: &'static str = r"^[A-Za-z_][A-Za-z0-9_]*$";

    const MAX_LENGTH: usize = 64;

    /// Create a new validated identifier
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if the name doesn't meet the rules above.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Identifier(name))
    }

    fn validate(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(RuleStoreError::InvalidIdentifier(name.to_string()));
        }

        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(Self::PATTERN).expect("identifier pattern is valid"));
        if !re.is_match(name) {
            return Err(RuleStoreError::InvalidIdentifier(name.to_string()));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for use inside SQL text
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Identifier {
    type Err = RuleStoreError;

    fn from_str(s: &str) -> Result<Self> {
        Identifier::new(s)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Identifier::new(s).map_err(serde::de::Error::custom)
    }
}

/// Name of the unique index guarding the rule tuple of `table`
///
/// Deterministic so that `ensure_table` can find an index it created earlier.
pub fn index_name(table: &Identifier) -> String {
    format!("idx_{}", table.as_str())
}
