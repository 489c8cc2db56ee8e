//! Repository: glue that atomically advances an aggregate's version,
//! persists its events, and decides when to snapshot (§4.5).

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::aggregate::{Aggregate, AggregateError, Applier};
use crate::event_store::{EventStore, EventStoreError};
use crate::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use crate::snapshot_policy::SnapshotPolicy;
use crate::stream::{AggregateId, Version};

/// Errors surfaced by repository operations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Another writer advanced the stream between load and save; the caller
    /// should reload and retry. The repository never reloads transparently.
    #[error("concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}")]
    Concurrency {
        /// The aggregate whose save was rejected.
        aggregate_id: AggregateId,
        /// The version the repository expected the stream to be at.
        expected: Version,
        /// The stream's actual current version.
        actual: Version,
    },

    /// Neither a snapshot nor any events exist for the requested aggregate.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// The aggregate's in-memory version and uncommitted-event count are
    /// inconsistent (would imply a negative expected version). This is a
    /// programmer error, not a runtime condition the caller can recover from
    /// by retrying.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// The domain applier rejected an event while replaying history.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// A non-conflict failure from the event store (connectivity, serialization).
    #[error("event store error: {0}")]
    EventStore(EventStoreError),

    /// A non-fatal snapshot failure surfaced during load (save-time snapshot
    /// failures are logged and swallowed, never returned here).
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl From<EventStoreError> for RepositoryError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => Self::Concurrency {
                aggregate_id,
                expected,
                actual,
            },
            other => Self::EventStore(other),
        }
    }
}

/// Loads and saves aggregates of domain state `S` using applier `A`.
///
/// Parameterized by an event store, an optional snapshot store + policy, and
/// an applier used to construct fresh aggregates. `S` must be `Default` (the
/// factory's starting state) and `Serialize + DeserializeOwned` (the
/// snapshot wire format, bincode by convention).
pub struct Repository<S, A>
where
    S: Default + Serialize + DeserializeOwned + Send + Sync,
    A: Applier<S> + Clone + Send + Sync,
{
    event_store: Arc<dyn EventStore>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    policy: Option<Arc<dyn SnapshotPolicy>>,
    aggregate_type: String,
    applier: A,
    _state: PhantomData<fn() -> S>,
}

impl<S, A> Repository<S, A>
where
    S: Default + Serialize + DeserializeOwned + Send + Sync,
    A: Applier<S> + Clone + Send + Sync,
{
    /// Build a repository with snapshotting disabled.
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>, aggregate_type: impl Into<String>, applier: A) -> Self {
        Self {
            event_store,
            snapshot_store: None,
            policy: None,
            aggregate_type: aggregate_type.into(),
            applier,
            _state: PhantomData,
        }
    }

    /// Enable snapshotting with the given store and policy (builder style).
    #[must_use]
    pub fn with_snapshots(
        mut self,
        snapshot_store: Arc<dyn SnapshotStore>,
        policy: Arc<dyn SnapshotPolicy>,
    ) -> Self {
        self.snapshot_store = Some(snapshot_store);
        self.policy = Some(policy);
        self
    }

    /// Construct a fresh, empty aggregate for `id` without touching storage.
    #[must_use]
    pub fn new_empty(&self, id: AggregateId) -> Aggregate<S, A> {
        Aggregate::new(id, S::default(), self.applier.clone())
    }

    /// Persist an aggregate's uncommitted events (§4.5 `Save`).
    ///
    /// A no-op, successful, if there are no uncommitted events. Snapshot
    /// failures are logged and never fail the save; only the event append
    /// can fail this call.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::InvalidVersion`]: the aggregate's version is
    ///   smaller than its own uncommitted-event count, which would require a
    ///   negative expected version.
    /// - [`RepositoryError::Concurrency`]: another writer advanced the
    ///   stream first.
    /// - [`RepositoryError::EventStore`]: a non-conflict backend failure.
    pub async fn save(&self, aggregate: &mut Aggregate<S, A>) -> Result<(), RepositoryError> {
        let uncommitted = aggregate.uncommitted_events();
        if uncommitted.is_empty() {
            return Ok(());
        }
        let uncommitted = uncommitted.to_vec();

        let expected = aggregate
            .version()
            .checked_sub(uncommitted.len() as u64)
            .ok_or_else(|| {
                RepositoryError::InvalidVersion(format!(
                    "aggregate {} version {} is smaller than its {} uncommitted events",
                    aggregate.id(),
                    aggregate.version(),
                    uncommitted.len()
                ))
            })?;

        tracing::debug!(
            aggregate_id = %aggregate.id(),
            expected_version = %expected,
            event_count = uncommitted.len(),
            "appending events"
        );

        let new_version = self
            .event_store
            .append_events(aggregate.id().clone(), expected, uncommitted)
            .await
            .inspect_err(|error| {
                if matches!(error, EventStoreError::ConcurrencyConflict { .. }) {
                    tracing::warn!(aggregate_id = %aggregate.id(), %error, "concurrency conflict on save");
                    metrics::counter!("repository.save.conflicts").increment(1);
                }
            })?;

        if let (Some(snapshot_store), Some(policy)) = (&self.snapshot_store, &self.policy) {
            if policy.should_snapshot(new_version) {
                match bincode::serialize(aggregate.state()) {
                    Ok(state) => {
                        let snapshot = Snapshot::new(
                            aggregate.id().clone(),
                            self.aggregate_type.clone(),
                            new_version,
                            state,
                            None,
                        );
                        if let Err(error) = snapshot_store.save(snapshot).await {
                            tracing::warn!(aggregate_id = %aggregate.id(), %error, "snapshot save failed, continuing");
                        } else {
                            metrics::counter!("repository.snapshots_saved.total").increment(1);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(aggregate_id = %aggregate.id(), %error, "snapshot serialization failed, continuing");
                    }
                }
            }
        }

        aggregate.mark_committed();
        Ok(())
    }

    /// Load an aggregate by id (§4.5 `GetByID`), preferring a snapshot plus
    /// delta replay and falling back to full replay when no usable snapshot
    /// exists.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::AggregateNotFound`]: neither a snapshot nor any
    ///   events exist for `id`.
    /// - [`RepositoryError::Aggregate`]: the applier rejected a historical event.
    /// - [`RepositoryError::EventStore`]: a backend failure while reading.
    pub async fn get_by_id(&self, id: AggregateId) -> Result<Aggregate<S, A>, RepositoryError> {
        if let Some(snapshot_store) = &self.snapshot_store {
            match snapshot_store.get(id.clone()).await {
                Ok(Some(snapshot)) => match bincode::deserialize::<S>(&snapshot.state) {
                    Ok(state) => {
                        let mut aggregate = Aggregate::new(id.clone(), state, self.applier.clone());
                        aggregate.set_version(snapshot.version);

                        let from = snapshot.version.next();
                        match self.event_store.get_events(id.clone(), from).await {
                            Ok(events) => {
                                aggregate.load_from_history(events)?;
                                return Ok(aggregate);
                            }
                            Err(EventStoreError::StreamNotFound(_)) => {
                                // No events past the snapshot: it was already current.
                                return Ok(aggregate);
                            }
                            Err(error) => return Err(error.into()),
                        }
                    }
                    Err(error) => {
                        tracing::warn!(aggregate_id = %id, %error, "snapshot corrupt, falling back to full replay");
                    }
                },
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(aggregate_id = %id, %error, "snapshot load failed, falling back to full replay");
                }
            }
        }

        let events = self.event_store.get_events(id.clone(), Version::new(0)).await?;
        if events.is_empty() {
            return Err(RepositoryError::AggregateNotFound(id));
        }

        let mut aggregate = Aggregate::new(id, S::default(), self.applier.clone());
        aggregate.load_from_history(events)?;
        Ok(aggregate)
    }

    /// Current version for `id`, or `Version::INITIAL` if it has no events.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::EventStore`] on backend failure.
    pub async fn get_version(&self, id: AggregateId) -> Result<Version, RepositoryError> {
        match self.event_store.get_events(id, Version::new(0)).await {
            Ok(events) => Ok(events.last().map_or(Version::INITIAL, |e| e.version)),
            Err(error) => Err(error.into()),
        }
    }

    /// Whether any events have ever been appended for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::EventStore`] on backend failure.
    pub async fn exists(&self, id: AggregateId) -> Result<bool, RepositoryError> {
        Ok(self.get_version(id).await?.value() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventMetadata, SerializedEvent};
    use serde::Deserialize;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum CounterEvent {
        Incremented,
    }

    impl Event for CounterEvent {
        fn event_type(&self) -> &'static str {
            "Counter.Incremented.v1"
        }
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
    struct CounterState {
        count: u64,
    }

    fn counter_applier(state: &mut CounterState, event: &SerializedEvent) -> Result<(), AggregateError> {
        if event.event_type == "Counter.Incremented.v1" {
            state.count += 1;
        }
        Ok(())
    }

    #[test]
    fn concurrency_conflict_maps_to_repository_error() {
        let error = EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new("a1"),
            expected: Version::new(1),
            actual: Version::new(2),
        };
        let repo_error: RepositoryError = error.into();
        assert!(matches!(repo_error, RepositoryError::Concurrency { .. }));
    }

    #[test]
    fn new_empty_starts_at_version_zero() {
        let event_store: Arc<dyn EventStore> = Arc::new(crate::test_support::NullEventStore);
        let repo: Repository<CounterState, _> =
            Repository::new(event_store, "Counter", counter_applier as fn(&mut CounterState, &SerializedEvent) -> Result<(), AggregateError>);
        let aggregate = repo.new_empty(AggregateId::new("c1"));
        assert_eq!(aggregate.version(), Version::new(0));
        assert_eq!(aggregate.state().count, 0);
    }

    #[test]
    fn save_is_noop_when_no_uncommitted_events() {
        let event_store: Arc<dyn EventStore> = Arc::new(crate::test_support::NullEventStore);
        let repo: Repository<CounterState, _> =
            Repository::new(event_store, "Counter", counter_applier as fn(&mut CounterState, &SerializedEvent) -> Result<(), AggregateError>);
        let mut aggregate = repo.new_empty(AggregateId::new("c1"));

        let result = tokio_test::block_on(repo.save(&mut aggregate));
        assert!(result.is_ok());
    }

    #[allow(dead_code)]
    fn sample_metadata() -> EventMetadata {
        EventMetadata::new("corr-1")
    }
}
