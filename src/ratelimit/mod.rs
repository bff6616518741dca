//! Sliding-window rate limiting and persisted state.

mod clock;
mod manager;
mod rules;
mod snapshot;
mod tick;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{Admission, Manager};
pub use rules::{RuleSet, RuleSpec};
pub use snapshot::{RuleRecord, Snapshot, SnapshotStore};
pub use tick::{Tick, TickKey, TickRegistry};
pub use window::RateRule;
