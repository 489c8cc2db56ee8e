//! In-memory projection testing utilities.
//!
//! Provides fast, deterministic testing infrastructure for projections:
//! - [`InMemoryProjectionStore`]: `HashMap`-based read-model storage
//! - [`ProjectionTestHarness`]: fluent API for projection tests

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use eventflow_core::event_store::StoredEvent;
use eventflow_core::projection::{Projection, ProjectionError, ProjectionStore};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// In-memory projection store for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use eventflow_testing::InMemoryProjectionStore;
/// use eventflow_core::projection::ProjectionStore;
///
/// # async fn example() {
/// let store = InMemoryProjectionStore::new();
/// store.save("customer:123", b"customer data").await.unwrap();
/// let data = store.get("customer:123").await.unwrap();
/// assert!(data.is_some());
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryProjectionStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryProjectionStore {
    /// Create a new empty in-memory projection store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all projection data, for test isolation.
    pub fn clear(&self) {
        self.data.write().unwrap().clear();
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// Whether `key` has a stored value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().unwrap().contains_key(key)
    }

    /// All stored keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().unwrap().keys().cloned().collect()
    }
}

impl ProjectionStore for InMemoryProjectionStore {
    fn save(&self, key: &str, data: &[u8]) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let key = key.to_string();
        let data = data.to_vec();
        Box::pin(async move {
            self.data.write().unwrap().insert(key, data);
            Ok(())
        })
    }

    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, ProjectionError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.data.read().unwrap().get(&key).cloned()) })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.data.write().unwrap().remove(&key);
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<bool, ProjectionError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.data.read().unwrap().contains_key(&key)) })
    }
}

/// Test harness for projections, providing a fluent testing API.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemoryProjectionStore::new());
/// let projection = MyProjection::new(store.clone());
/// let mut harness = ProjectionTestHarness::new(projection, store);
///
/// harness.given_events(&[event1, event2]).await.unwrap();
/// harness.then_contains("order-1").await.unwrap();
/// ```
pub struct ProjectionTestHarness<P: Projection> {
    projection: P,
    store: Arc<InMemoryProjectionStore>,
}

impl<P: Projection> ProjectionTestHarness<P> {
    /// Create a new test harness for `projection`, which must share `store`
    /// as its backing read-model storage.
    #[must_use]
    pub const fn new(projection: P, store: Arc<InMemoryProjectionStore>) -> Self {
        Self { projection, store }
    }

    /// Apply a series of events to the projection in order.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if any event fails to apply.
    pub async fn given_events(&self, events: &[StoredEvent]) -> Result<&Self, ProjectionError> {
        for event in events {
            self.projection.handle(event).await?;
        }
        Ok(self)
    }

    /// Apply a single event to the projection.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the event fails to apply.
    pub async fn given_event(&self, event: &StoredEvent) -> Result<&Self, ProjectionError> {
        self.projection.handle(event).await?;
        Ok(self)
    }

    /// Assert that the projection store contains `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the query fails.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not found (this is a test assertion).
    #[allow(clippy::panic)]
    pub async fn then_contains(&self, key: &str) -> Result<&Self, ProjectionError> {
        let exists = self.store.exists(key).await?;
        assert!(exists, "expected projection store to contain key '{key}', but it was not found");
        Ok(self)
    }

    /// Assert that the projection store does not contain `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the query fails.
    ///
    /// # Panics
    ///
    /// Panics if `key` is found (this is a test assertion).
    #[allow(clippy::panic)]
    pub async fn then_not_contains(&self, key: &str) -> Result<&Self, ProjectionError> {
        let exists = self.store.exists(key).await?;
        assert!(!exists, "expected projection store to NOT contain key '{key}', but it was found");
        Ok(self)
    }

    /// Fetch raw data from the projection store.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the query fails.
    pub async fn get_data(&self, key: &str) -> Result<Option<Vec<u8>>, ProjectionError> {
        self.store.get(key).await
    }

    /// The underlying projection store.
    #[must_use]
    pub const fn store(&self) -> &Arc<InMemoryProjectionStore> {
        &self.store
    }

    /// The projection under test.
    #[must_use]
    pub const fn projection(&self) -> &P {
        &self.projection
    }

    /// Clear all data from the projection store.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of entries in the projection store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the projection store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eventflow_core::event::{EventMetadata, SerializedEvent};
    use eventflow_core::position::GlobalPosition;
    use eventflow_core::stream::{AggregateId, Version};

    struct EchoProjection {
        store: Arc<InMemoryProjectionStore>,
    }

    impl Projection for EchoProjection {
        fn name(&self) -> &str {
            "echo"
        }

        fn handle(&self, event: &StoredEvent) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
            let key = event.aggregate_id().to_string();
            let payload = event.event.payload.clone();
            Box::pin(async move { self.store.save(&key, &payload).await })
        }
    }

    fn test_stored_event(aggregate_id: &str) -> StoredEvent {
        let aggregate_id = AggregateId::new(aggregate_id);
        StoredEvent {
            event: SerializedEvent::new("Echoed.v1".to_string(), aggregate_id, Utc::now(), EventMetadata::new("corr"), vec![1, 2, 3]),
            version: Version::new(1),
            position: GlobalPosition::new(1),
            aggregate_type: "Echo".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn harness_applies_events_and_asserts_contents() {
        let store = Arc::new(InMemoryProjectionStore::new());
        let projection = EchoProjection { store: store.clone() };
        let harness = ProjectionTestHarness::new(projection, store);

        let event = test_stored_event("order-1");
        harness.given_event(&event).await.unwrap();
        harness.then_contains("order-1").await.unwrap();
        harness.then_not_contains("order-2").await.unwrap();
    }
}
