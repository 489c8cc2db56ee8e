//! In-memory storage backends for fast, deterministic tests.
//!
//! Each type implements the matching `eventflow_core` trait with the exact
//! same concurrency and checkpoint semantics as the Postgres backends, so
//! tests written against these doubles exercise real repository/projection
//! behavior rather than a simplified stand-in.

use chrono::{DateTime, Utc};
use eventflow_core::checkpoint::{CheckpointError, CheckpointStore};
use eventflow_core::event::SerializedEvent;
use eventflow_core::event_store::{EventStore, EventStoreError, StoredEvent, StoredEventStream};
use eventflow_core::position::GlobalPosition;
use eventflow_core::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use eventflow_core::stream::{AggregateId, Version};
use futures::stream;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

/// In-memory [`EventStore`] for tests.
///
/// The version check and the append happen while holding the same write
/// lock, so concurrent appends to the same aggregate can't both observe the
/// pre-append version (the same race a Postgres advisory lock closes).
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<StoredEvent>>,
}

impl InMemoryEventStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all stored events, for test isolation.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.events.write().expect("event store lock poisoned").clear();
    }

    /// Total number of events stored across all aggregates.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().expect("event store lock poisoned").len()
    }

    /// Whether the store holds no events.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().expect("event store lock poisoned").is_empty()
    }
}

fn aggregate_type_of(event_type: &str) -> String {
    event_type.split('.').next().unwrap_or(event_type).to_string()
}

impl EventStore for InMemoryEventStore {
    fn append_events(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            if events.is_empty() {
                return Err(EventStoreError::InvalidVersion("append_events requires at least one event".to_string()));
            }
            if events.iter().any(|e| e.aggregate_id != aggregate_id) {
                return Err(EventStoreError::InvalidVersion(
                    "all events in a batch must share the same aggregate_id".to_string(),
                ));
            }

            let mut store = self.events.write().expect("event store lock poisoned");

            let current_version = store
                .iter()
                .filter(|e| *e.aggregate_id() == aggregate_id)
                .map(|e| e.version)
                .max()
                .unwrap_or(Version::INITIAL);

            if current_version != expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual: current_version,
                });
            }

            let mut version = expected_version;
            for event in events {
                version = version.next();
                let position = GlobalPosition::new(store.len() as u64 + 1);
                store.push(StoredEvent {
                    aggregate_type: aggregate_type_of(&event.event_type),
                    created_at: event.occurred_at,
                    event,
                    version,
                    position,
                });
            }

            Ok(version)
        })
    }

    fn get_events(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let store = self.events.read().expect("event store lock poisoned");
            let matching: Vec<StoredEvent> = store
                .iter()
                .filter(|e| *e.aggregate_id() == aggregate_id && e.version >= from_version)
                .cloned()
                .collect();

            if matching.is_empty() && from_version.value() > 0 {
                return Err(EventStoreError::StreamNotFound(aggregate_id));
            }

            Ok(matching)
        })
    }

    fn get_events_by_type(
        &self,
        event_type: &str,
        from_timestamp: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        let event_type = event_type.to_string();
        Box::pin(async move {
            let store = self.events.read().expect("event store lock poisoned");
            let mut matching: Vec<StoredEvent> = store
                .iter()
                .filter(|e| e.event.event_type == event_type && e.created_at >= from_timestamp)
                .cloned()
                .collect();
            matching.sort_by_key(|e| e.position);
            Ok(matching)
        })
    }

    fn get_all(&self, from_position: GlobalPosition) -> StoredEventStream<'_> {
        let snapshot: Vec<StoredEvent> = {
            let store = self.events.read().expect("event store lock poisoned");
            store.iter().filter(|e| e.position >= from_position).cloned().collect()
        };
        Box::pin(stream::iter(snapshot.into_iter().map(Ok)))
    }
}

/// In-memory [`SnapshotStore`] for tests.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<AggregateId, Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all snapshots, for test isolation.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.snapshots.write().expect("snapshot store lock poisoned").clear();
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, snapshot: Snapshot) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>> {
        Box::pin(async move {
            self.snapshots
                .write()
                .expect("snapshot store lock poisoned")
                .insert(snapshot.aggregate_id.clone(), snapshot);
            Ok(())
        })
    }

    fn get(&self, aggregate_id: AggregateId) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>, SnapshotError>> + Send + '_>> {
        Box::pin(async move { Ok(self.snapshots.read().expect("snapshot store lock poisoned").get(&aggregate_id).cloned()) })
    }

    fn delete_before(
        &self,
        aggregate_id: AggregateId,
        version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>> {
        Box::pin(async move {
            let mut snapshots = self.snapshots.write().expect("snapshot store lock poisoned");
            if let Some(existing) = snapshots.get(&aggregate_id) {
                if existing.version < version {
                    snapshots.remove(&aggregate_id);
                }
            }
            Ok(())
        })
    }
}

/// In-memory [`CheckpointStore`] for tests.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    positions: RwLock<HashMap<String, GlobalPosition>>,
}

impl InMemoryCheckpointStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all checkpoints, for test isolation.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.positions.write().expect("checkpoint store lock poisoned").clear();
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(
        &self,
        projection_name: &str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            self.positions
                .write()
                .expect("checkpoint store lock poisoned")
                .insert(projection_name, position);
            Ok(())
        })
    }

    fn get(&self, projection_name: &str) -> Pin<Box<dyn Future<Output = Result<GlobalPosition, CheckpointError>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            Ok(self
                .positions
                .read()
                .expect("checkpoint store lock poisoned")
                .get(&projection_name)
                .copied()
                .unwrap_or(GlobalPosition::START))
        })
    }

    fn delete(&self, projection_name: &str) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            self.positions.write().expect("checkpoint store lock poisoned").remove(&projection_name);
            Ok(())
        })
    }

    fn list(&self) -> Pin<Box<dyn Future<Output = Result<HashMap<String, GlobalPosition>, CheckpointError>> + Send + '_>> {
        Box::pin(async move { Ok(self.positions.read().expect("checkpoint store lock poisoned").clone()) })
    }
}
