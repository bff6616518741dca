//! Configuration management for Ratekeeper.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ratelimit::{RuleSet, SnapshotStore};

/// Main configuration for Ratekeeper.
#[derive(Debug, Clone, Default)]
pub struct RatekeeperConfig {
    /// Configured rules, if the file declares any
    pub rules: Option<RuleSet>,

    /// Log persistence configuration
    pub log: LogConfig,

    /// Diagnostic logging configuration
    pub logging: LoggingConfig,
}

/// On-disk shape of the configuration file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    rules: Option<serde_yaml::Value>,
    #[serde(default)]
    log: LogConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// What to do when the prior log exists but cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptLogPolicy {
    /// Refuse to start
    #[default]
    Fail,
    /// Warn and start from empty prior state
    Reset,
}

/// How log records are matched to configured rules on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilePolicy {
    /// Reuse a record only when interval and amount both match
    #[default]
    Exact,
    /// Reuse a record whenever the interval matches
    Interval,
}

/// Log persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Where snapshots are written
    #[serde(default = "default_log_path")]
    pub path: PathBuf,

    /// Where prior state is read from (defaults to `path`)
    #[serde(default)]
    pub load_path: Option<PathBuf>,

    /// Behavior on an unparseable prior log
    #[serde(default)]
    pub on_corrupt: CorruptLogPolicy,

    /// Matching of log records to configured rules
    #[serde(default)]
    pub reconcile: ReconcilePolicy,

    /// Also persist after every admission
    #[serde(default)]
    pub persist_on_admit: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            load_path: None,
            on_corrupt: CorruptLogPolicy::default(),
            reconcile: ReconcilePolicy::default(),
            persist_on_admit: false,
        }
    }
}

fn default_log_path() -> PathBuf {
    PathBuf::from("log.json")
}

impl LogConfig {
    /// A config reading and writing `path` with default policies.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// The snapshot store described by this config.
    pub fn store(&self) -> SnapshotStore {
        match &self.load_path {
            Some(load_path) => SnapshotStore::with_load_path(&self.path, load_path),
            None => SnapshotStore::new(&self.path),
        }
    }
}

/// Diagnostic logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl RatekeeperConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        let rules = raw
            .rules
            .as_ref()
            .map(RuleSet::from_yaml_value)
            .transpose()?;

        Ok(Self {
            rules,
            log: raw.log,
            logging: raw.logging,
        })
    }
}
