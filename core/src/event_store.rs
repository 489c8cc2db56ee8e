//! Event store trait and related types for event sourcing.
//!
//! This module defines the core abstraction for an event store: a specialized
//! append-only log optimized for storing and retrieving event streams with
//! optimistic concurrency control and a strictly monotonic global position.
//!
//! # Design
//!
//! The `EventStore` trait is deliberately minimal and focused. It provides exactly
//! what's needed for event sourcing (§4.1):
//!
//! - Append events to a stream with optimistic concurrency.
//! - Load events from a single stream for state reconstruction.
//! - Query events across streams by type.
//! - Tail the entire log in global-position order for projections.
//!
//! Snapshot persistence is a separate concern, owned by [`crate::snapshot::SnapshotStore`]
//! (§4.2) — an event store implementation commonly backs both traits with the same
//! connection pool, but the contracts are independent.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (in the `eventflow-postgres` crate): durable, production implementation.
//! - `InMemoryEventStore` (in the `eventflow-testing` crate): fast, deterministic testing.
//!
//! # Dyn Compatibility
//!
//! This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
//! to enable trait object usage (`Arc<dyn EventStore>`), which the repository and
//! projection runtime rely on to stay generic over backends.

use crate::event::SerializedEvent;
use crate::position::GlobalPosition;
use crate::stream::{AggregateId, Version};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match current version.
    ///
    /// This error occurs when trying to append events with an expected version that
    /// doesn't match the stream's current version. This typically means another process
    /// has modified the stream concurrently.
    #[error("concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate stream where the conflict occurred.
        aggregate_id: AggregateId,
        /// The version the caller expected the stream to be at.
        expected: Version,
        /// The actual current version of the stream.
        actual: Version,
    },

    /// Read from a non-existent stream with `from_version > 0`.
    #[error("stream not found: {0}")]
    StreamNotFound(AggregateId),

    /// Negative or otherwise malformed version argument.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Unable to materialize a stored event's payload.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Failed to serialize events for storage.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Connectivity, timeout, or other backend failure. Propagated untouched.
    #[error("backend error: {0}")]
    BackendError(String),
}

/// An event as returned by the event store, with store-assigned positioning.
///
/// Carries every field of [`SerializedEvent`] plus the stream-scoped `version`,
/// the globally monotonic `position`, a derived `aggregate_type` classifier, and
/// the ingestion `created_at` timestamp (§3).
#[derive(Clone, Debug)]
pub struct StoredEvent {
    /// The underlying envelope (id, type, aggregate, metadata, payload).
    pub event: SerializedEvent,

    /// 1-based position within the aggregate's stream. Dense, gap-free.
    pub version: Version,

    /// 1-based position within the global log. Strictly increasing across all streams.
    pub position: GlobalPosition,

    /// Classifier for the owning aggregate (e.g. `"Account"`, `"Order"`).
    pub aggregate_type: String,

    /// When the store ingested this event (may differ from `occurred_at`).
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// The aggregate id this event belongs to.
    #[must_use]
    pub fn aggregate_id(&self) -> &AggregateId {
        &self.event.aggregate_id
    }

    /// The event type tag (e.g. `"OrderPlaced.v1"`).
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    /// Reconstruct this event's concrete value through `registry`, falling
    /// back to a [`crate::event::PlaceholderEvent`] for an unrecognized
    /// `event_type` (§4.1, §6). The store itself only ever hands callers the
    /// opaque `event.payload` bytes; this is the path generic tooling
    /// (replay inspection, audit logging, the DLQ viewer) uses to get back a
    /// typed value without hard-coding every event type it might see.
    #[must_use]
    pub fn resolve(&self, registry: &crate::event::EventDeserializerRegistry) -> crate::event::ResolvedEvent {
        self.event.resolve(registry)
    }
}

/// A boxed, owned stream of stored events or store errors.
pub type StoredEventStream<'a> =
    Pin<Box<dyn Stream<Item = Result<StoredEvent, EventStoreError>> + Send + 'a>>;

/// Event store abstraction for storing and retrieving event streams.
///
/// An event store is a specialized database optimized for:
///
/// - Appending events to streams (immutable, append-only).
/// - Loading events for state reconstruction.
/// - Optimistic concurrency control.
/// - Tailing the global log for projections.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be safely used in async contexts
/// and shared across threads.
///
/// # Design Philosophy
///
/// The event store is deliberately simple and focused. It does NOT provide:
/// - Aggregate reconstitution (that's [`crate::repository::Repository`]'s job).
/// - Snapshot persistence (that's [`crate::snapshot::SnapshotStore`]'s job).
/// - Saga orchestration or message-bus bridging (out of scope entirely).
pub trait EventStore: Send + Sync {
    /// Append events to a stream with optimistic concurrency control.
    ///
    /// # Parameters
    ///
    /// - `aggregate_id`: The stream to append events to.
    /// - `expected_version`: The version the caller believes the stream is currently at.
    /// - `events`: Events to append, in order. Must be non-empty and share `aggregate_id`.
    ///
    /// Computes `current_version = max(version) for aggregate_id, or 0 if empty`. If
    /// `expected_version != current_version`, fails with `ConcurrencyConflict` and
    /// persists nothing. Otherwise assigns versions `expected_version+1 ..` and global
    /// positions atomically; the whole batch becomes visible to reads only once durable.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: version mismatch (concurrent modification detected).
    /// - `InvalidVersion`: `events` is empty, or events carry mismatched `aggregate_id`s.
    /// - `BackendError`: connectivity or query failure.
    /// - `SerializationError`: failed to persist the event payloads.
    fn append_events(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// Load events from a single stream, ordered ascending by version.
    ///
    /// `from_version` is inclusive: events with `version >= from_version` are returned.
    /// If `from_version > 0` and no matching events exist, fails with `StreamNotFound`.
    /// With `from_version == 0` on an empty stream, returns an empty sequence — new
    /// streams are not an error, only explicit reads past the known tail are.
    ///
    /// # Errors
    ///
    /// - `StreamNotFound`: `from_version > 0` and the stream has no events at or after it.
    /// - `BackendError`: connectivity or query failure.
    /// - `DeserializationError`: a stored payload could not be read back.
    fn get_events(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>>;

    /// Load events across all streams matching an event type.
    ///
    /// Returns events whose `event_type` matches and whose `occurred_at >= from_timestamp`,
    /// ordered by global `position`.
    ///
    /// # Errors
    ///
    /// - `BackendError`: connectivity or query failure.
    /// - `DeserializationError`: a stored payload could not be read back.
    fn get_events_by_type(
        &self,
        event_type: &str,
        from_timestamp: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>>;

    /// Open a lazy stream of every event from `from_position` (inclusive) to the current tail.
    ///
    /// The returned stream is finite: it ends once the current tail is reached. Tailing
    /// new writes is the responsibility of the caller (the projection runner re-opens
    /// with a backoff, §4.7). Dropping the stream must stop production promptly.
    ///
    /// Implementations MUST fix the read view (copy or snapshot the candidate range)
    /// under their internal lock before yielding control to the consumer, so that
    /// concurrent appends cannot corrupt an in-flight iteration.
    fn get_all(&self, from_position: GlobalPosition) -> StoredEventStream<'_>;
}
