//! Time sources for the rate limiting engine.
//!
//! The engine never reads the wall clock directly; every `Manager` is
//! handed a [`Clock`] so that tests can pin or step time.

use std::sync::Arc;

use parking_lot::Mutex;

/// A source of "now" in fractional seconds since the Unix epoch.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let now = chrono::Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
    }
}

/// A manually driven clock.
///
/// Clones share the same reading, so a test can keep one handle and move
/// time forward while the `Manager` holds another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    /// Create a clock fixed at `now`.
    pub fn new(now: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }
}
