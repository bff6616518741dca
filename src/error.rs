//! Error types for the Ratekeeper engine.

use std::path::PathBuf;
use thiserror::Error;

/// Rejections raised while validating a rule set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The rules value was not an `interval -> amount` mapping
    #[error("Rules is not a mapping of interval to amount")]
    NotAMapping,

    /// The mapping contained no rules
    #[error("At least one rule is required")]
    Empty,

    /// A key or value was not an integer
    #[error("Rules and amounts must be integers: {0}")]
    NotAnInteger(String),

    /// An interval or amount was zero or negative
    #[error("Rules and amounts must be positive integer values: {interval}: {amount}")]
    NonPositive { interval: i64, amount: i64 },

    /// The same interval was configured twice
    #[error("Duplicate rule interval: {0}")]
    DuplicateInterval(u64),
}

/// Main error type for Ratekeeper operations.
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal invariant violations in the windowing engine
    #[error("Consistency fault: {0}")]
    Consistency(String),

    /// The log file could not be read or written
    #[error("Persistence error on {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The log file exists but is not a valid snapshot
    #[error("Malformed log {}: {source}", .path.display())]
    LogFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors outside of the log file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RatekeeperError {
    pub(crate) fn consistency(msg: impl Into<String>) -> Self {
        RatekeeperError::Consistency(msg.into())
    }
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;
