use thiserror::Error;

/// Errors returned by rule store operations
#[derive(Error, Debug)]
pub enum RuleStoreError {
    /// SQLite error other than a constraint failure
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Insert or update would duplicate a stored rule
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Offset filter is all wildcards or does not fit the field columns
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Rule tuple is empty or too long, or update lists differ in length
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// No stored rule matches the rule being updated
    #[error("Rule not found: {0:?}")]
    RuleNotFound(Vec<String>),

    /// Several stored rules match the rule being updated
    #[error("Ambiguous update: {matched} rows match {rule:?} (expected exactly one)")]
    AmbiguousUpdate { rule: Vec<String>, matched: usize },

    /// Error inside a transaction; the transaction was rolled back
    #[error("Transaction failed during {operation}: {source}")]
    Transaction {
        operation: &'static str,
        #[source]
        source: Box<RuleStoreError>,
    },

    /// Table or column name is not a plain SQL identifier
    #[error("Invalid identifier: {0} (must match [A-Za-z_][A-Za-z0-9_]*, max 64 characters)")]
    InvalidIdentifier(String),

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// TOML configuration could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Reading a configuration file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuleStoreError {
    /// Innermost error, looking through `Transaction` wrappers
    pub fn root_cause(&self) -> &RuleStoreError {
        match self {
            RuleStoreError::Transaction { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the root cause is a duplicate-rule constraint failure
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self.root_cause(), RuleStoreError::ConstraintViolation(_))
    }
}

impl From<rusqlite::Error> for RuleStoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RuleStoreError::ConstraintViolation(
                    message.unwrap_or_else(|| code.to_string()),
                )
            }
            other => RuleStoreError::Database(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleStoreError>;
