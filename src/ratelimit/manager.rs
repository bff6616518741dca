//! The rate manager: owns every rule and the shared tick registry.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::rules::RuleSet;
use super::snapshot::{RuleRecord, Snapshot, SnapshotStore};
use super::tick::{TickKey, TickRegistry};
use super::window::RateRule;
use crate::config::{CorruptLogPolicy, LogConfig, ReconcilePolicy};
use crate::error::{RatekeeperError, Result};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// The event was recorded against every rule
    Admitted,
    /// The event was refused; retry after this many seconds
    Wait(f64),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    /// `0` when admitted, otherwise the positive wait.
    pub fn wait_secs(&self) -> f64 {
        match self {
            Admission::Admitted => 0.0,
            Admission::Wait(secs) => *secs,
        }
    }
}

/// Multi-rule sliding-window rate limiter with a persisted log.
///
/// The most restrictive rule governs each admission, and an admitted event
/// counts against all rules at once. The manager is single-threaded; an
/// embedding that shares one across threads must serialize access itself.
pub struct Manager<C: Clock = SystemClock> {
    /// One rule per configured interval, in registration order
    rules: Vec<RateRule>,
    /// Every tick referenced by any rule
    registry: TickRegistry,
    store: SnapshotStore,
    persist_on_admit: bool,
    clock: C,
}

impl Manager<SystemClock> {
    /// Create a manager reading and writing `log_path` with default policies.
    pub fn new(rules: RuleSet, log_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(rules, LogConfig::at(log_path))
    }

    /// Create a manager on the wall clock.
    pub fn with_config(rules: RuleSet, log: LogConfig) -> Result<Self> {
        Manager::with_clock(rules, log, SystemClock)
    }
}

impl<C: Clock> Manager<C> {
    /// Create a manager, reconcile it against the prior log and persist the
    /// normalized snapshot.
    pub fn with_clock(rules: RuleSet, log: LogConfig, clock: C) -> Result<Self> {
        let store = log.store();
        let prior = load_prior(&store, log.on_corrupt)?;

        let mut manager = Self {
            rules: rules
                .iter()
                .map(|spec| RateRule::new(spec.interval, spec.amount))
                .collect(),
            registry: TickRegistry::new(),
            store,
            persist_on_admit: log.persist_on_admit,
            clock,
        };

        if let Some(prior) = &prior {
            manager.replay(prior, log.reconcile)?;
        }

        let now = manager.clock.now();
        let mut pruned = 0;
        for rule in &mut manager.rules {
            pruned += rule.prune(&mut manager.registry, now)?;
        }

        manager.sync_file()?;

        info!(
            rules = manager.rules.len(),
            ticks = manager.registry.len(),
            pruned,
            path = %manager.store.path().display(),
            "Rate manager initialized"
        );
        Ok(manager)
    }

    /// Attach logged timestamps to matching rules, replaying them in global
    /// chronological order.
    fn replay(&mut self, prior: &Snapshot, policy: ReconcilePolicy) -> Result<()> {
        let mut pending: Vec<(TickKey, usize)> = Vec::new();

        for (index, rule) in self.rules.iter().enumerate() {
            let record = match policy {
                ReconcilePolicy::Exact => prior.find(rule.interval(), rule.amount()),
                ReconcilePolicy::Interval => prior.find_interval(rule.interval()),
            };
            let Some(record) = record else {
                debug!(
                    interval = rule.interval(),
                    amount = rule.amount(),
                    "No logged history for rule"
                );
                continue;
            };
            pending.extend(record_keys(record).into_iter().map(|key| (key, index)));
        }

        for record in &prior.records {
            let configured = self.rules.iter().any(|rule| match policy {
                ReconcilePolicy::Exact => {
                    rule.interval() == record.interval && rule.amount() == record.amount
                }
                ReconcilePolicy::Interval => rule.interval() == record.interval,
            });
            if !configured {
                info!(
                    interval = record.interval,
                    amount = record.amount,
                    times = record.times.len(),
                    "Dropping logged rule that is no longer configured"
                );
            }
        }

        pending.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        for (key, index) in pending {
            self.registry.ensure(key);
            self.rules[index].admit(key, &mut self.registry)?;
        }
        Ok(())
    }

    /// Timestamp for a new tick admitted at `now`. Never earlier than the
    /// newest recorded tick, so every window stays in chronological order.
    fn insertion_time(&self, now: f64) -> f64 {
        match self.registry.latest() {
            Some(latest) if now < latest.timestamp() => {
                warn!(
                    clock = now,
                    latest = latest.timestamp(),
                    "Clock is behind the newest recorded event, recording at newest"
                );
                latest.timestamp()
            }
            _ => now,
        }
    }

    /// Decide whether an event may happen now, recording it if so.
    pub fn check(&mut self) -> Result<Admission> {
        let now = self.clock.now();

        let mut wait = f64::NEG_INFINITY;
        for rule in &mut self.rules {
            wait = wait.max(rule.wait_time(&mut self.registry, now)?);
        }

        if wait <= 0.0 {
            let key = self.registry.insert_new(self.insertion_time(now));
            for rule in &mut self.rules {
                rule.admit(key, &mut self.registry)?;
            }
            debug!(at = now, tick = %key, "Event admitted");

            if self.persist_on_admit {
                self.sync_file()?;
            }
            return Ok(Admission::Admitted);
        }

        debug!(at = now, wait, "Event refused");
        self.sync_file()?;
        Ok(Admission::Wait(wait))
    }

    /// Seconds to wait before the next event; `0` means the event was
    /// admitted.
    pub fn check_time(&mut self) -> Result<f64> {
        Ok(self.check()?.wait_secs())
    }

    /// Overwrite the log with the current state.
    pub fn sync_file(&self) -> Result<()> {
        self.store.persist(&self.snapshot())
    }

    /// The current state in its persisted form.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.rules
                .iter()
                .map(|rule| RuleRecord {
                    interval: rule.interval(),
                    amount: rule.amount(),
                    times: rule.timestamps(),
                })
                .collect(),
        )
    }

    pub fn rules(&self) -> &[RateRule] {
        &self.rules
    }

    pub fn registry(&self) -> &TickRegistry {
        &self.registry
    }
}

fn load_prior(store: &SnapshotStore, policy: CorruptLogPolicy) -> Result<Option<Snapshot>> {
    match store.load() {
        Err(RatekeeperError::LogFormat { path, source }) if policy == CorruptLogPolicy::Reset => {
            warn!(
                path = %path.display(),
                error = %source,
                "Prior log is malformed, starting from empty state"
            );
            Ok(None)
        }
        other => other,
    }
}

/// Keys for one record's timestamps. The k-th occurrence of a timestamp maps
/// to ordinal k, so equal timestamps in different rules share a tick.
fn record_keys(record: &RuleRecord) -> Vec<TickKey> {
    let mut times = record.times.clone();
    times.sort_by(f64::total_cmp);

    let mut seen: HashMap<u64, u32> = HashMap::new();
    times
        .into_iter()
        .map(|at| {
            let ordinal = seen.entry(at.to_bits()).or_insert(0);
            let key = TickKey::new(at, *ordinal);
            *ordinal += 1;
            key
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use proptest::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn rules(pairs: &[(i64, i64)]) -> RuleSet {
        RuleSet::from_pairs(pairs.iter().copied()).unwrap()
    }

    fn manager_at(
        pairs: &[(i64, i64)],
        path: &Path,
        clock: &ManualClock,
    ) -> Manager<ManualClock> {
        Manager::with_clock(rules(pairs), LogConfig::at(path), clock.clone()).unwrap()
    }

    /// Every registry entry is held by exactly `refcount` rules, and every
    /// key a rule holds is registered.
    fn assert_refcounts<C: Clock>(manager: &Manager<C>) {
        for (key, tick) in manager.registry().iter() {
            let holders = manager.rules().iter().filter(|r| r.contains(key)).count();
            assert!(tick.refcount() >= 1);
            assert_eq!(tick.refcount(), holders, "refcount mismatch on {key}");
        }
        for rule in manager.rules() {
            for key in rule.keys() {
                assert!(manager.registry().contains(key));
            }
        }
    }

    #[test]
    fn test_second_event_in_window_is_refused() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(50.0);
        let mut manager = manager_at(&[(100, 1)], &dir.path().join("log.json"), &clock);

        assert_eq!(manager.check_time().unwrap(), 0.0);
        let wait = manager.check_time().unwrap();
        assert!(wait > 0.0);
        assert_eq!(wait, 100.0);
    }

    #[test]
    fn test_amount_events_at_same_instant() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(50.0);
        let mut manager = manager_at(&[(100, 3)], &dir.path().join("log.json"), &clock);

        for _ in 0..3 {
            assert_eq!(manager.check_time().unwrap(), 0.0);
        }
        assert!(manager.check_time().unwrap() > 0.0);
        assert_eq!(manager.registry().len(), 3);
        assert_refcounts(&manager);
    }

    #[test]
    fn test_slot_reopens_after_window() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(10.0);
        let mut manager = manager_at(&[(100, 1)], &dir.path().join("log.json"), &clock);

        assert_eq!(manager.check_time().unwrap(), 0.0);
        clock.set(110.1);
        assert_eq!(manager.check_time().unwrap(), 0.0);
        assert_eq!(manager.rules()[0].timestamps(), vec![110.1]);
        assert_eq!(manager.registry().len(), 1);
    }

    #[test]
    fn test_wait_is_exact_remaining_time() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(10.0);
        let mut manager = manager_at(&[(2, 1)], &dir.path().join("log.json"), &clock);

        assert_eq!(manager.check_time().unwrap(), 0.0);
        clock.set(11.0);
        assert_eq!(manager.check_time().unwrap(), 1.0);
    }

    #[test]
    fn test_event_at_window_edge_is_admitted() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(10.0);
        let mut manager = manager_at(&[(2, 1)], &dir.path().join("log.json"), &clock);

        assert_eq!(manager.check_time().unwrap(), 0.0);
        clock.set(12.0);
        assert_eq!(manager.check_time().unwrap(), 0.0);

        // The boundary tick is trimmed as excess on the next check.
        clock.set(12.5);
        assert_eq!(manager.check_time().unwrap(), 1.5);
        assert_eq!(manager.rules()[0].timestamps(), vec![12.0]);
        assert_refcounts(&manager);
    }

    #[test]
    fn test_load_existing_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, r#"[{"1": {"amount": 1, "times": [10.0]}}]"#).unwrap();

        let clock = ManualClock::new(10.1);
        let manager = manager_at(&[(1, 1)], &path, &clock);

        assert_eq!(manager.registry().len(), 1);
        assert_eq!(manager.rules().len(), 1);
        assert_eq!(manager.rules()[0].timestamps(), vec![10.0]);
    }

    #[test]
    fn test_excess_on_load_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, r#"[{"2": {"amount": 2, "times": [10.0, 10.5, 11.0]}}]"#).unwrap();

        let clock = ManualClock::new(11.2);
        let manager = manager_at(&[(2, 2)], &path, &clock);

        assert_eq!(manager.rules()[0].timestamps(), vec![10.5, 11.0]);
        assert_eq!(manager.registry().len(), 2);
        assert_refcounts(&manager);
    }

    #[test]
    fn test_load_shares_ticks_across_rules() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(
            &path,
            r#"[
                {"10": {"amount": 5, "times": [95.0, 99.0]}},
                {"100": {"amount": 50, "times": [20.0, 95.0, 99.0]}}
            ]"#,
        )
        .unwrap();

        let clock = ManualClock::new(100.0);
        let manager = manager_at(&[(10, 5), (100, 50)], &path, &clock);

        assert_eq!(manager.registry().len(), 3);
        assert_eq!(manager.registry().refcount(&TickKey::new(95.0, 0)), 2);
        assert_eq!(manager.registry().refcount(&TickKey::new(20.0, 0)), 1);
        assert_refcounts(&manager);
    }

    #[test]
    fn test_load_drops_expired_and_unconfigured() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(
            &path,
            r#"[
                {"10": {"amount": 5, "times": [1.0, 95.0]}},
                {"7": {"amount": 1, "times": [99.0]}}
            ]"#,
        )
        .unwrap();

        let clock = ManualClock::new(100.0);
        let manager = manager_at(&[(10, 5)], &path, &clock);

        assert_eq!(manager.rules()[0].timestamps(), vec![95.0]);
        assert_eq!(manager.registry().len(), 1);

        // The normalized snapshot replaces the old log immediately.
        let on_disk = Snapshot::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, manager.snapshot());
        assert_eq!(on_disk.records.len(), 1);
    }

    #[test]
    fn test_exact_reconcile_ignores_changed_amount() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, r#"[{"60": {"amount": 10, "times": [90.0, 95.0, 99.0]}}]"#).unwrap();

        let clock = ManualClock::new(100.0);
        let manager = manager_at(&[(60, 2)], &path, &clock);

        assert!(manager.rules()[0].is_empty());
        assert!(manager.registry().is_empty());
    }

    #[test]
    fn test_interval_reconcile_trims_shrunken_amount() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, r#"[{"60": {"amount": 10, "times": [90.0, 95.0, 99.0]}}]"#).unwrap();

        let log = LogConfig {
            reconcile: ReconcilePolicy::Interval,
            ..LogConfig::at(&path)
        };
        let manager = Manager::with_clock(rules(&[(60, 2)]), log, ManualClock::new(100.0)).unwrap();

        assert_eq!(manager.rules()[0].timestamps(), vec![95.0, 99.0]);
        assert_eq!(manager.registry().len(), 2);
    }

    #[test]
    fn test_corrupt_log_fails_by_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, "[{\"1\": ").unwrap();

        let result = Manager::with_clock(rules(&[(1, 1)]), LogConfig::at(&path), ManualClock::new(1.0));
        assert!(matches!(result, Err(RatekeeperError::LogFormat { .. })));
        // The corrupt file is left untouched for inspection.
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"1\": ");
    }

    #[test]
    fn test_corrupt_log_reset_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, "garbage").unwrap();

        let log = LogConfig {
            on_corrupt: CorruptLogPolicy::Reset,
            ..LogConfig::at(&path)
        };
        let manager = Manager::with_clock(rules(&[(1, 1)]), log, ManualClock::new(1.0)).unwrap();

        assert!(manager.registry().is_empty());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"[{"1":{"amount":1,"times":[]}}]"#
        );
    }

    #[test]
    fn test_refusal_persists_but_admission_does_not() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        let clock = ManualClock::new(10.0);
        let mut manager = manager_at(&[(100, 1)], &path, &clock);

        manager.check().unwrap();
        let after_admit = Snapshot::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(after_admit.records[0].times.is_empty());

        assert!(!manager.check().unwrap().is_admitted());
        let after_refusal = Snapshot::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(after_refusal.records[0].times, vec![10.0]);
    }

    #[test]
    fn test_persist_on_admit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        let log = LogConfig {
            persist_on_admit: true,
            ..LogConfig::at(&path)
        };
        let mut manager = Manager::with_clock(rules(&[(100, 5)]), log, ManualClock::new(10.0)).unwrap();

        assert_eq!(manager.check().unwrap(), Admission::Admitted);
        let on_disk = Snapshot::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.records[0].times, vec![10.0]);
    }

    #[test]
    fn test_separate_load_path() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("archive.json");
        let scratch = dir.path().join("scratch.json");
        fs::write(&archive, r#"[{"100": {"amount": 1, "times": [5.0]}}]"#).unwrap();

        let log = LogConfig {
            load_path: Some(archive.clone()),
            ..LogConfig::at(&scratch)
        };
        let mut manager = Manager::with_clock(rules(&[(100, 1)]), log, ManualClock::new(10.0)).unwrap();

        assert_eq!(manager.check_time().unwrap(), 95.0);
        let written = Snapshot::from_json(&fs::read_to_string(&scratch).unwrap()).unwrap();
        assert_eq!(written.records[0].times, vec![5.0]);
        assert_eq!(
            fs::read_to_string(&archive).unwrap(),
            r#"[{"100": {"amount": 1, "times": [5.0]}}]"#
        );
    }

    #[test]
    fn test_most_restrictive_rule_governs() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(0.0);
        let mut manager = manager_at(&[(10, 2), (60, 3)], &dir.path().join("log.json"), &clock);

        assert_eq!(manager.check_time().unwrap(), 0.0);
        clock.set(1.0);
        assert_eq!(manager.check_time().unwrap(), 0.0);
        clock.set(2.0);
        // 10s rule: oldest of last two is at 0 -> 8s left.
        assert_eq!(manager.check_time().unwrap(), 8.0);

        clock.set(11.0);
        assert_eq!(manager.check_time().unwrap(), 0.0);
        clock.set(30.0);
        // 60s rule is full now: event at 0 leaves the window at 60.
        assert_eq!(manager.check_time().unwrap(), 30.0);
        assert_refcounts(&manager);
    }

    #[test]
    fn test_clock_behind_latest_tick_records_at_latest() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(100.0);
        let mut manager = manager_at(&[(10, 5)], &dir.path().join("log.json"), &clock);

        assert_eq!(manager.check_time().unwrap(), 0.0);
        clock.set(90.0);
        assert_eq!(manager.check_time().unwrap(), 0.0);

        let keys: Vec<TickKey> = manager.rules()[0].keys().copied().collect();
        assert_eq!(keys, vec![TickKey::new(100.0, 0), TickKey::new(100.0, 1)]);
    }

    #[test]
    fn test_wait_uses_clock_reading_when_behind_latest_tick() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(100.0);
        let mut manager = manager_at(&[(10, 1)], &dir.path().join("log.json"), &clock);

        assert_eq!(manager.check_time().unwrap(), 0.0);
        clock.set(95.0);
        // The slot opens at 110 on the clock, 15s from the current reading.
        assert_eq!(manager.check_time().unwrap(), 15.0);
    }

    #[test]
    fn test_future_logged_tick_waits_until_it_expires() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, r#"[{"10": {"amount": 1, "times": [2000.0]}}]"#).unwrap();

        let clock = ManualClock::new(1000.0);
        let mut manager = manager_at(&[(10, 1)], &path, &clock);

        let wait = manager.check_time().unwrap();
        assert_eq!(wait, 1010.0);

        clock.advance(wait);
        assert_eq!(manager.check_time().unwrap(), 0.0);
        assert_eq!(manager.rules()[0].timestamps(), vec![2000.0, 2010.0]);
        assert_refcounts(&manager);
    }

    #[test]
    fn test_failed_persist_leaves_state_usable() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("state");
        fs::create_dir(&log_dir).unwrap();
        let path = log_dir.join("log.json");
        let clock = ManualClock::new(10.0);
        let mut manager = manager_at(&[(5, 1), (20, 2)], &path, &clock);

        assert_eq!(manager.check().unwrap(), Admission::Admitted);
        fs::remove_dir_all(&log_dir).unwrap();

        clock.set(12.0);
        let err = manager.check().unwrap_err();
        assert!(matches!(err, RatekeeperError::Persistence { .. }));
        assert_eq!(manager.registry().len(), 1);
        assert_refcounts(&manager);

        // Admissions do not touch the log, so the manager keeps working.
        clock.set(15.5);
        assert_eq!(manager.check().unwrap(), Admission::Admitted);
        assert_eq!(manager.rules()[0].timestamps(), vec![15.5]);
        assert_eq!(manager.rules()[1].timestamps(), vec![10.0, 15.5]);
        assert_refcounts(&manager);
    }

    #[test]
    fn test_round_trip_and_idempotent_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        let clock = ManualClock::new(1000.0);

        let mut manager = manager_at(&[(10, 3), (60, 5)], &path, &clock);
        for step in 0..8 {
            clock.set(1000.0 + f64::from(step) * 2.5);
            manager.check().unwrap();
        }
        manager.sync_file().unwrap();
        let before = manager.snapshot();
        drop(manager);

        let first = manager_at(&[(10, 3), (60, 5)], &path, &clock);
        assert_eq!(first.snapshot(), before);
        assert_refcounts(&first);
        drop(first);

        let first_disk = fs::read_to_string(&path).unwrap();
        let second = manager_at(&[(10, 3), (60, 5)], &path, &clock);
        assert_eq!(fs::read_to_string(&path).unwrap(), first_disk);
        assert_eq!(second.snapshot(), before);
    }

    #[test]
    fn test_record_keys_assign_ordinals_per_occurrence() {
        let record = RuleRecord {
            interval: 1,
            amount: 5,
            times: vec![3.0, 1.0, 3.0],
        };
        assert_eq!(
            record_keys(&record),
            vec![
                TickKey::new(1.0, 0),
                TickKey::new(3.0, 0),
                TickKey::new(3.0, 1)
            ]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_admission_matches_rule_waits(
            specs in proptest::collection::btree_map(1i64..40, 1i64..6, 1..4),
            steps in proptest::collection::vec(0.0f64..15.0, 1..40),
        ) {
            let dir = TempDir::new().unwrap();
            let clock = ManualClock::new(1_000.0);
            let pairs: Vec<(i64, i64)> = specs.into_iter().collect();
            let mut manager = manager_at(&pairs, &dir.path().join("log.json"), &clock);

            for dt in steps {
                clock.advance(dt);
                let now = clock.now();

                let mut rules = manager.rules.clone();
                let mut registry = manager.registry.clone();
                let expected_admit = rules
                    .iter_mut()
                    .map(|r| r.wait_time(&mut registry, now).unwrap())
                    .all(|w| w <= 0.0);

                let wait = manager.check_time().unwrap();
                prop_assert_eq!(wait == 0.0, expected_admit);
                prop_assert!(wait >= 0.0);

                for rule in manager.rules.iter_mut() {
                    rule.prune(&mut manager.registry, now).unwrap();
                }
                for rule in manager.rules() {
                    prop_assert!(rule.len() as u64 <= rule.amount());
                    for key in rule.keys() {
                        prop_assert!(key.timestamp() + rule.interval() as f64 >= now);
                    }
                }
                assert_refcounts(&manager);
            }
        }
    }
}
