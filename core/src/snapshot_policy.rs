//! Snapshot policies: predicates deciding when the repository persists a snapshot.
//!
//! Evaluation must be cheap (no I/O) — the repository consults the policy
//! synchronously after every successful append (§4.3).

use std::num::NonZeroU64;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::stream::Version;

/// A predicate deciding whether the repository should persist a snapshot
/// after advancing an aggregate to `version`.
///
/// Implementations that carry state (e.g. [`TimePolicy`]) must be internally
/// synchronized, since a single policy instance may be shared across many
/// aggregates handled concurrently by different repository calls.
pub trait SnapshotPolicy: Send + Sync {
    /// Decide whether to snapshot now that the aggregate is at `version`.
    fn should_snapshot(&self, version: Version) -> bool;
}

/// Snapshot every `N` events: true when `version > 0 && version % N == 0`.
#[derive(Debug)]
pub struct FrequencyPolicy {
    every: NonZeroU64,
}

impl FrequencyPolicy {
    /// Snapshot every `every` events.
    #[must_use]
    pub const fn new(every: NonZeroU64) -> Self {
        Self { every }
    }
}

impl SnapshotPolicy for FrequencyPolicy {
    fn should_snapshot(&self, version: Version) -> bool {
        let v = version.value();
        v > 0 && v % self.every.get() == 0
    }
}

/// Snapshot at most once every `interval` of wall-clock time.
///
/// Retains the instant of the last affirmative decision; thread-safe via an
/// internal mutex since the same policy instance may back concurrent saves
/// for different aggregates.
#[derive(Debug)]
pub struct TimePolicy {
    interval: Duration,
    last_triggered: Mutex<Option<Instant>>,
}

impl TimePolicy {
    /// Snapshot at most once per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_triggered: Mutex::new(None),
        }
    }
}

impl SnapshotPolicy for TimePolicy {
    fn should_snapshot(&self, _version: Version) -> bool {
        let now = Instant::now();
        // Lock poisoning would indicate a prior panic while holding this
        // lock; treat it the same as "not yet triggered" rather than
        // propagating, since missing one snapshot opportunity is harmless.
        let mut last_triggered = match self.last_triggered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let due = match *last_triggered {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        };

        if due {
            *last_triggered = Some(now);
        }
        due
    }
}

/// Logical OR of a frequency and a time policy; both sub-policies always
/// evaluate (and update their own state) regardless of which one fires.
pub struct HybridPolicy {
    frequency: FrequencyPolicy,
    time: TimePolicy,
}

impl HybridPolicy {
    /// Combine a frequency threshold and a time interval.
    #[must_use]
    pub fn new(every: NonZeroU64, interval: Duration) -> Self {
        Self {
            frequency: FrequencyPolicy::new(every),
            time: TimePolicy::new(interval),
        }
    }
}

impl SnapshotPolicy for HybridPolicy {
    fn should_snapshot(&self, version: Version) -> bool {
        let by_frequency = self.frequency.should_snapshot(version);
        let by_time = self.time.should_snapshot(version);
        by_frequency || by_time
    }
}

/// A policy that never recommends a snapshot; used when snapshotting is disabled.
#[derive(Debug, Default)]
pub struct NeverPolicy;

impl SnapshotPolicy for NeverPolicy {
    fn should_snapshot(&self, _version: Version) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_policy_triggers_on_multiples() {
        let policy = FrequencyPolicy::new(NonZeroU64::new(10).unwrap());

        for v in 1..=25u64 {
            let expected = v > 0 && v % 10 == 0;
            assert_eq!(
                policy.should_snapshot(Version::new(v)),
                expected,
                "version {v}"
            );
        }
    }

    #[test]
    fn frequency_policy_never_triggers_at_zero() {
        let policy = FrequencyPolicy::new(NonZeroU64::new(10).unwrap());
        assert!(!policy.should_snapshot(Version::new(0)));
    }

    #[test]
    fn time_policy_triggers_once_then_waits() {
        let policy = TimePolicy::new(Duration::from_secs(3600));
        assert!(policy.should_snapshot(Version::new(1)));
        assert!(!policy.should_snapshot(Version::new(2)));
    }

    #[test]
    fn hybrid_policy_triggers_if_either_fires() {
        let policy = HybridPolicy::new(NonZeroU64::new(10).unwrap(), Duration::from_secs(3600));

        // First call: time policy fires unconditionally (never triggered yet).
        assert!(policy.should_snapshot(Version::new(3)));
        // Second call: neither the frequency boundary nor the time interval has passed.
        assert!(!policy.should_snapshot(Version::new(4)));
        // Frequency boundary crossed: fires regardless of time.
        assert!(policy.should_snapshot(Version::new(10)));
    }

    #[test]
    fn never_policy_always_false() {
        let policy = NeverPolicy;
        assert!(!policy.should_snapshot(Version::new(100)));
    }
}
