//! Injected dependencies that domain code needs but shouldn't own directly.
//!
//! Currently just [`Clock`]: aggregates and the projection runner both need
//! "now", and hard-coding `Utc::now()` throughout makes replay and backoff
//! timing untestable.

use chrono::{DateTime, Utc};

/// Abstracts time so tests can use a fixed or simulated clock instead of the
/// system clock.
///
/// `eventflow-testing` provides `FixedClock` for deterministic tests.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock, used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_recent_time() {
        let before = Utc::now();
        let now = SystemClock.now();
        let after = Utc::now();
        assert!(now >= before && now <= after);
    }
}
