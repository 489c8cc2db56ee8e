//! Integration tests for the in-memory projection testing utilities.

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use eventflow_core::event::{EventMetadata, SerializedEvent};
use eventflow_core::event_store::StoredEvent;
use eventflow_core::position::GlobalPosition;
use eventflow_core::projection::{Projection, ProjectionError, ProjectionStore};
use eventflow_core::stream::{AggregateId, Version};
use eventflow_testing::{InMemoryProjectionStore, ProjectionTestHarness};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A projection that tracks order totals keyed by order id, and removes the
/// key entirely once an order is cancelled.
#[derive(Clone)]
struct OrderTotalsProjection {
    store: Arc<InMemoryProjectionStore>,
}

impl Projection for OrderTotalsProjection {
    fn name(&self) -> &str {
        "order_totals"
    }

    fn handle(&self, event: &StoredEvent) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let key = event.aggregate_id().as_str().to_string();
        let event_type = event.event.event_type.clone();
        let payload = event.event.payload.clone();
        Box::pin(async move {
            match event_type.as_str() {
                "Order.Cancelled.v1" => self.store.delete(&key).await,
                _ => self.store.save(&key, &payload).await,
            }
        })
    }

    fn reset(&self) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        Box::pin(async move {
            self.store.clear();
            Ok(())
        })
    }
}

fn stored_event(aggregate_id: &str, event_type: &str, payload: Vec<u8>, position: u64) -> StoredEvent {
    let aggregate_id = AggregateId::new(aggregate_id);
    StoredEvent {
        event: SerializedEvent::new(event_type.to_string(), aggregate_id, Utc::now(), EventMetadata::new("corr"), payload),
        version: Version::new(1),
        position: GlobalPosition::new(position),
        aggregate_type: "Order".to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn store_save_get_delete_roundtrip() {
    let store = InMemoryProjectionStore::new();
    assert!(store.is_empty());

    store.save("order-1", b"total:10").await.unwrap();
    assert_eq!(store.get("order-1").await.unwrap(), Some(b"total:10".to_vec()));
    assert!(store.exists("order-1").await.unwrap());

    store.delete("order-1").await.unwrap();
    assert_eq!(store.get("order-1").await.unwrap(), None);
    assert!(!store.exists("order-1").await.unwrap());
}

#[tokio::test]
async fn store_overwrite_keeps_single_key() {
    let store = InMemoryProjectionStore::new();
    store.save("order-1", b"total:10").await.unwrap();
    store.save("order-1", b"total:25").await.unwrap();

    assert_eq!(store.get("order-1").await.unwrap(), Some(b"total:25".to_vec()));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn store_keys_and_clear() {
    let store = InMemoryProjectionStore::new();
    store.save("order-1", b"a").await.unwrap();
    store.save("order-2", b"b").await.unwrap();

    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys, vec!["order-1", "order-2"]);

    store.clear();
    assert!(store.is_empty());
}

#[tokio::test]
async fn harness_applies_events_in_order() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let projection = OrderTotalsProjection { store: store.clone() };
    let harness = ProjectionTestHarness::new(projection, store);

    let events = vec![
        stored_event("order-1", "Order.Placed.v1", b"total:10".to_vec(), 1),
        stored_event("order-1", "Order.Updated.v1", b"total:25".to_vec(), 2),
        stored_event("order-2", "Order.Placed.v1", b"total:5".to_vec(), 3),
    ];

    harness.given_events(&events).await.unwrap();

    harness.then_contains("order-1").await.unwrap();
    harness.then_contains("order-2").await.unwrap();
    assert_eq!(harness.get_data("order-1").await.unwrap(), Some(b"total:25".to_vec()));
    assert_eq!(harness.len(), 2);
}

#[tokio::test]
async fn harness_cancellation_removes_projection_entry() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let projection = OrderTotalsProjection { store: store.clone() };
    let harness = ProjectionTestHarness::new(projection, store);

    harness.given_event(&stored_event("order-1", "Order.Placed.v1", b"total:10".to_vec(), 1)).await.unwrap();
    harness.then_contains("order-1").await.unwrap();

    harness.given_event(&stored_event("order-1", "Order.Cancelled.v1", vec![], 2)).await.unwrap();
    harness.then_not_contains("order-1").await.unwrap();
    assert!(harness.is_empty());
}

#[tokio::test]
async fn harness_reset_clears_read_model() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let projection = OrderTotalsProjection { store: store.clone() };
    let harness = ProjectionTestHarness::new(projection, store);

    harness.given_event(&stored_event("order-1", "Order.Placed.v1", b"total:10".to_vec(), 1)).await.unwrap();
    assert_eq!(harness.len(), 1);

    harness.projection().reset().await.unwrap();
    assert!(harness.is_empty());
}

#[tokio::test]
async fn harness_exposes_projection_name() {
    let store = Arc::new(InMemoryProjectionStore::new());
    let projection = OrderTotalsProjection { store: store.clone() };
    let harness = ProjectionTestHarness::new(projection, store);

    assert_eq!(harness.projection().name(), "order_totals");
}
