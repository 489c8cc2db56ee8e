//! Shared test doubles used across this crate's own unit tests.
//!
//! Not part of the public API: `eventflow-testing` provides the real
//! in-memory backends for downstream consumers.

#![cfg(test)]

use crate::event::SerializedEvent;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, StoredEventStream};
use crate::position::GlobalPosition;
use crate::stream::{AggregateId, Version};
use chrono::{DateTime, Utc};
use futures::stream;
use std::future::Future;
use std::pin::Pin;

/// An [`EventStore`] that panics if any method is actually invoked; useful
/// for tests that only exercise code paths which never touch storage (e.g.
/// `Repository::save` with no uncommitted events).
pub struct NullEventStore;

impl EventStore for NullEventStore {
    fn append_events(
        &self,
        _aggregate_id: AggregateId,
        _expected_version: Version,
        _events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async { unreachable!("NullEventStore::append_events should not be called") })
    }

    fn get_events(
        &self,
        _aggregate_id: AggregateId,
        _from_version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async { unreachable!("NullEventStore::get_events should not be called") })
    }

    fn get_events_by_type(
        &self,
        _event_type: &str,
        _from_timestamp: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async { unreachable!("NullEventStore::get_events_by_type should not be called") })
    }

    fn get_all(&self, _from_position: GlobalPosition) -> StoredEventStream<'_> {
        Box::pin(stream::empty())
    }
}
