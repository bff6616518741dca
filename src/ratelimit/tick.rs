//! Admitted-event timestamps and the registry that owns them.
//!
//! A single admitted event counts against every rule at once, so rules do
//! not own their timestamps. The [`TickRegistry`] is an arena of [`Tick`]s
//! keyed by [`TickKey`]; rules hold keys and the registry tracks how many
//! rules still reference each one.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{RatekeeperError, Result};

/// Identifies one tick in the registry.
///
/// Events admitted at an identical clock reading are distinct ticks and are
/// told apart by `ordinal`, which counts up from zero per timestamp.
#[derive(Debug, Clone, Copy)]
pub struct TickKey {
    at: f64,
    ordinal: u32,
}

impl TickKey {
    pub fn new(at: f64, ordinal: u32) -> Self {
        Self { at, ordinal }
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> f64 {
        self.at
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

impl PartialEq for TickKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TickKey {}

impl PartialOrd for TickKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TickKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then(self.ordinal.cmp(&other.ordinal))
    }
}

impl fmt::Display for TickKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ordinal == 0 {
            write!(f, "{}", self.at)
        } else {
            write!(f, "{}#{}", self.at, self.ordinal)
        }
    }
}

/// One admitted event.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    timestamp: f64,
    refcount: usize,
}

impl Tick {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            refcount: 0,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Number of rules whose window currently holds this tick.
    pub fn refcount(&self) -> usize {
        self.refcount
    }

    pub fn increment_ref(&mut self) {
        self.refcount += 1;
    }

    /// Returns the remaining count, or `None` if already at zero.
    pub fn decrement_ref(&mut self) -> Option<usize> {
        self.refcount = self.refcount.checked_sub(1)?;
        Some(self.refcount)
    }
}

/// The shared arena of live ticks, ordered chronologically.
#[derive(Debug, Clone, Default)]
pub struct TickRegistry {
    ticks: BTreeMap<TickKey, Tick>,
}

impl TickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh tick at `at`, after any ticks already recorded at
    /// that exact timestamp.
    pub fn insert_new(&mut self, at: f64) -> TickKey {
        let ordinal = self
            .ticks
            .range(TickKey::new(at, 0)..=TickKey::new(at, u32::MAX))
            .next_back()
            .map_or(0, |(key, _)| key.ordinal + 1);
        let key = TickKey::new(at, ordinal);
        self.ticks.insert(key, Tick::new(at));
        key
    }

    /// Get the tick for `key`, creating it if absent.
    pub fn ensure(&mut self, key: TickKey) -> &mut Tick {
        self.ticks
            .entry(key)
            .or_insert_with(|| Tick::new(key.timestamp()))
    }

    /// Record one more rule referencing `key`.
    pub fn acquire(&mut self, key: TickKey) -> Result<()> {
        let tick = self.ticks.get_mut(&key).ok_or_else(|| {
            RatekeeperError::consistency(format!("acquire of unregistered tick {key}"))
        })?;
        tick.increment_ref();
        Ok(())
    }

    /// Drop one rule's reference to `key`, evicting the tick when no rule
    /// holds it any more. Returns whether the tick was evicted.
    pub fn release(&mut self, key: TickKey) -> Result<bool> {
        let tick = self.ticks.get_mut(&key).ok_or_else(|| {
            RatekeeperError::consistency(format!("release of unregistered tick {key}"))
        })?;
        let remaining = tick.decrement_ref().ok_or_else(|| {
            RatekeeperError::consistency(format!("refcount underflow on tick {key}"))
        })?;
        if remaining == 0 {
            self.ticks.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn contains(&self, key: &TickKey) -> bool {
        self.ticks.contains_key(key)
    }

    /// Reference count for `key`, zero when not registered.
    pub fn refcount(&self, key: &TickKey) -> usize {
        self.ticks.get(key).map_or(0, Tick::refcount)
    }

    /// The most recent tick, if any.
    pub fn latest(&self) -> Option<TickKey> {
        self.ticks.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Iterate ticks oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&TickKey, &Tick)> {
        self.ticks.iter()
    }
}
