//! In-memory test doubles for the event-sourcing runtime.
//!
//! This crate provides:
//! - [`in_memory::InMemoryEventStore`], [`in_memory::InMemorySnapshotStore`],
//!   [`in_memory::InMemoryCheckpointStore`] — drop-in replacements for the
//!   Postgres backends with the same concurrency and checkpoint semantics
//! - [`mocks::FixedClock`] — deterministic time for reproducible tests
//! - [`projection_mocks::ProjectionTestHarness`] — a fluent API for testing projections
//!
//! ## Example
//!
//! ```
//! use eventflow_testing::in_memory::InMemoryEventStore;
//! use eventflow_core::event_store::EventStore;
//! use eventflow_core::event::{EventMetadata, SerializedEvent};
//! use eventflow_core::stream::{AggregateId, Version};
//! use chrono::Utc;
//!
//! # async fn example() {
//! let store = InMemoryEventStore::new();
//! let aggregate_id = AggregateId::new("account-1");
//! let event = SerializedEvent::new(
//!     "Account.Opened.v1".to_string(),
//!     aggregate_id.clone(),
//!     Utc::now(),
//!     EventMetadata::new("corr-1"),
//!     vec![],
//! );
//!
//! let version = store.append_events(aggregate_id, Version::INITIAL, vec![event]).await.unwrap();
//! assert_eq!(version, Version::new(1));
//! # }
//! ```

use chrono::{DateTime, Utc};
use eventflow_core::environment::Clock;

pub mod in_memory;
pub mod projection_mocks;

/// Mock implementations of runtime-facing traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// A clock that always returns the same fixed time, for reproducible tests.
    ///
    /// # Example
    ///
    /// ```
    /// use eventflow_testing::mocks::FixedClock;
    /// use eventflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a fixed clock that always reports `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A fixed clock reporting 2025-01-01 00:00:00 UTC, for tests that don't
    /// care about a specific timestamp but want determinism.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which should never happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use in_memory::{InMemoryCheckpointStore, InMemoryEventStore, InMemorySnapshotStore};
pub use mocks::{FixedClock, test_clock};
pub use projection_mocks::{InMemoryProjectionStore, ProjectionTestHarness};
