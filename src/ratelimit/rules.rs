//! Rate rule configuration and validation.
//!
//! A rule set is a mapping of window length in seconds to the number of
//! events allowed per window. Rule sets are validated once, up front; a
//! `Manager` is never built from an invalid one.

use std::fmt;
use std::str::FromStr;

use serde_yaml::Value;

use crate::error::{ConfigError, Result};

/// One configured rule: at most `amount` events per `interval` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleSpec {
    pub interval: u64,
    pub amount: u64,
}

impl RuleSpec {
    /// Validate a raw `interval -> amount` pair.
    pub fn new(interval: i64, amount: i64) -> std::result::Result<Self, ConfigError> {
        if interval <= 0 || amount <= 0 {
            return Err(ConfigError::NonPositive { interval, amount });
        }
        Ok(Self {
            interval: interval as u64,
            amount: amount as u64,
        })
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.interval, self.amount)
    }
}

/// Parses `INTERVAL=AMOUNT`, e.g. `60=10`.
impl FromStr for RuleSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (interval, amount) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::NotAnInteger(s.to_string()))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::NotAnInteger(s.to_string()))
        };
        RuleSpec::new(parse(interval)?, parse(amount)?)
    }
}

/// A validated, non-empty set of rules in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<RuleSpec>,
}

impl RuleSet {
    /// Build a rule set from `(interval, amount)` pairs.
    pub fn from_pairs<I>(pairs: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        let specs = pairs
            .into_iter()
            .map(|(interval, amount)| RuleSpec::new(interval, amount))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::from_specs(specs)
    }

    /// Build a rule set from already-parsed specs.
    pub fn from_specs<I>(specs: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = RuleSpec>,
    {
        let mut rules: Vec<RuleSpec> = Vec::new();
        for spec in specs {
            if rules.iter().any(|r| r.interval == spec.interval) {
                return Err(ConfigError::DuplicateInterval(spec.interval));
            }
            rules.push(spec);
        }
        if rules.is_empty() {
            return Err(ConfigError::Empty);
        }
        Ok(Self { rules })
    }

    /// Load a rule set from a YAML mapping such as `{60: 10, 3600: 100}`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Ok(Self::from_yaml_value(&value)?)
    }

    /// Validate an already-parsed YAML value.
    pub fn from_yaml_value(value: &Value) -> std::result::Result<Self, ConfigError> {
        let mapping = value.as_mapping().ok_or(ConfigError::NotAMapping)?;
        let pairs = mapping
            .iter()
            .map(|(key, value)| Ok((yaml_integer(key)?, yaml_integer(value)?)))
            .collect::<std::result::Result<Vec<_>, ConfigError>>()?;
        Self::from_pairs(pairs)
    }

    /// Amount configured for `interval`, if any.
    pub fn get(&self, interval: u64) -> Option<u64> {
        self.rules
            .iter()
            .find(|r| r.interval == interval)
            .map(|r| r.amount)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn yaml_integer(value: &Value) -> std::result::Result<i64, ConfigError> {
    value.as_i64().ok_or_else(|| {
        let rendered = serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("{value:?}"));
        ConfigError::NotAnInteger(rendered)
    })
}
