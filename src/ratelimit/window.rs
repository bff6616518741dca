//! Sliding-window rate rules.

use std::collections::VecDeque;

use tracing::trace;

use super::tick::{TickKey, TickRegistry};
use crate::error::{RatekeeperError, Result};

/// "At most `amount` events per `interval` seconds."
///
/// The window holds keys into a shared [`TickRegistry`], oldest first. It is
/// a true sliding window: the limit is enforced against the `amount`-th most
/// recent event rather than a counter that resets on a fixed boundary.
#[derive(Debug, Clone)]
pub struct RateRule {
    interval: u64,
    amount: u64,
    window: VecDeque<TickKey>,
}

impl RateRule {
    /// Create a rule with an empty window.
    pub fn new(interval: u64, amount: u64) -> Self {
        Self {
            interval,
            amount,
            window: VecDeque::new(),
        }
    }

    /// Window length in seconds.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Maximum events per window.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn contains(&self, key: &TickKey) -> bool {
        self.window.contains(key)
    }

    /// Keys currently counted against this rule, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &TickKey> {
        self.window.iter()
    }

    /// Timestamps currently counted against this rule, oldest first.
    pub fn timestamps(&self) -> Vec<f64> {
        self.window.iter().map(TickKey::timestamp).collect()
    }

    fn capacity(&self) -> usize {
        usize::try_from(self.amount).unwrap_or(usize::MAX)
    }

    /// Append `key` as the newest event in the window.
    ///
    /// Keys must arrive in chronological order.
    pub fn admit(&mut self, key: TickKey, registry: &mut TickRegistry) -> Result<()> {
        if let Some(last) = self.window.back() {
            if key <= *last {
                return Err(RatekeeperError::consistency(format!(
                    "rule {}/{}: admit of {key} does not follow {last}",
                    self.interval, self.amount
                )));
            }
        }
        registry.acquire(key)?;
        self.window.push_back(key);
        Ok(())
    }

    /// Remove `key` from the window and drop this rule's reference to it.
    pub fn release(&mut self, key: TickKey, registry: &mut TickRegistry) -> Result<()> {
        let index = self.window.iter().position(|k| *k == key).ok_or_else(|| {
            RatekeeperError::consistency(format!(
                "rule {}/{}: release of {key} not in window",
                self.interval, self.amount
            ))
        })?;
        self.window.remove(index);
        registry.release(key)?;
        Ok(())
    }

    /// Number of oldest entries that exceed `amount`.
    pub fn excess_len(&self) -> usize {
        self.window.len().saturating_sub(self.capacity())
    }

    /// Length of the expired prefix that follows the first `skip` entries.
    ///
    /// Stops at the first entry still inside the window. An entry is inside
    /// while `timestamp + interval >= now`.
    pub fn expired_prefix_len(&self, skip: usize, now: f64) -> usize {
        let interval = self.interval as f64;
        self.window
            .iter()
            .skip(skip)
            .take_while(|key| key.timestamp() + interval < now)
            .count()
    }

    /// Release excess entries, then expired ones. Returns how many were
    /// released.
    pub fn prune(&mut self, registry: &mut TickRegistry, now: f64) -> Result<usize> {
        let excess = self.excess_len();
        let expired = self.expired_prefix_len(excess, now);
        let released = excess + expired;
        if released == 0 {
            return Ok(0);
        }

        trace!(
            interval = self.interval,
            amount = self.amount,
            excess,
            expired,
            "Pruning rule window"
        );

        for key in self.window.drain(..released) {
            registry.release(key)?;
        }
        Ok(released)
    }

    /// Seconds until this rule allows another event.
    ///
    /// Prunes first. A result `<= 0` means an event may happen now; only a
    /// full window can yield a positive wait.
    pub fn wait_time(&mut self, registry: &mut TickRegistry, now: f64) -> Result<f64> {
        self.prune(registry, now)?;

        let interval = self.interval as f64;
        let len = self.window.len();
        let amount = self.capacity();
        if len >= amount {
            let governing = self.window[len - amount];
            return Ok(governing.timestamp() + interval - now);
        }
        if let Some(oldest) = self.window.front() {
            return Ok(oldest.timestamp() - now - interval);
        }
        Ok(0.0)
    }
}
