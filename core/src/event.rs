//! Event trait, metadata, and the serialized envelope used for storage.
//!
//! This module defines the core abstractions for events in an event-sourced system.
//! Events represent facts about things that have happened in the past and are immutable.
//!
//! # Design
//!
//! Domain event payloads are serialized using `bincode` for maximum performance and
//! minimal storage overhead. While this means events are not human-readable in the
//! database, it provides significant benefits:
//!
//! - 5-10x faster serialization compared to JSON
//! - 30-70% smaller storage footprint
//! - All-Rust services can use the same binary format
//!
//! Metadata (correlation/causation, and any open-ended application fields) is kept
//! separate from the payload and serialized as JSON, since it is commonly inspected
//! or queried by tooling outside the owning service.
//!
//! # Example
//!
//! ```
//! use eventflow_core::event::Event;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum OrderEvent {
//!     OrderPlaced { order_id: String, total: f64 },
//!     OrderShipped { order_id: String, tracking: String },
//! }
//!
//! impl Event for OrderEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             OrderEvent::OrderPlaced { .. } => "OrderPlaced.v1",
//!             OrderEvent::OrderShipped { .. } => "OrderShipped.v1",
//!         }
//!     }
//! }
//! ```

use crate::stream::AggregateId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// An event that can be stored in an event store and replayed to reconstruct state.
///
/// Events represent immutable facts about things that have happened in the past.
/// They are the source of truth in an event-sourced system.
///
/// # Event Naming Convention
///
/// The `event_type()` method should return a stable string identifier that includes
/// a version number. This allows for schema evolution over time. For example:
///
/// - `"OrderPlaced.v1"`
/// - `"OrderCancelled.v1"`
/// - `"OrderShipped.v2"` (after schema change)
///
/// # Serialization
///
/// Events are serialized to binary format using `bincode` for performance and
/// storage efficiency. The trait provides default implementations that work for
/// any type implementing `Serialize` and `DeserializeOwned`.
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` to be safely passed between threads
/// in the async runtime and stored in the event store.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    ///
    /// Used to store the event type in the database, route events to the
    /// correct deserializer, and version event schemas.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes cannot be deserialized
    /// into this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// Open-ended metadata carried alongside every event.
///
/// `correlation_id` links all events that resulted from the same originating
/// request or workflow; `causation_id` links an event to the specific event
/// or command that directly caused it. Both are plain strings so callers can
/// populate them from whatever request-tracing scheme they already use.
///
/// `extra` holds additional application-defined fields (e.g. `user_id`,
/// `tenant_id`) that don't warrant dedicated struct fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Links related events across one logical operation or workflow.
    pub correlation_id: String,

    /// Links this event to the event or command that directly caused it.
    pub causation_id: Option<String>,

    /// Additional application-defined key/value fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl EventMetadata {
    /// Create metadata with just a correlation id.
    #[must_use]
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            causation_id: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the causation id (builder style).
    #[must_use]
    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    /// Insert an additional field (builder style).
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Serialize metadata to a JSON value for storage in JSONB/JSON columns.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the metadata cannot be represented as JSON,
    /// which should not happen for this type.
    pub fn to_json(&self) -> Result<serde_json::Value, EventError> {
        serde_json::to_value(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize metadata from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the value doesn't match the expected shape.
    pub fn from_json(value: serde_json::Value) -> Result<Self, EventError> {
        serde_json::from_value(value).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for storage.
///
/// This struct is the wire format between the application and the event
/// store: it carries the envelope fields required by §3 (`event_id`,
/// `event_type`, `aggregate_id`, `occurred_at`, `metadata`) plus the
/// bincode-serialized domain payload. The store assigns `version` and
/// `position` at append time, producing a [`crate::event_store::StoredEvent`].
#[derive(Clone, Debug)]
pub struct SerializedEvent {
    /// Globally unique identifier for this event, assigned at construction.
    pub event_id: Uuid,

    /// The event type identifier (e.g., "OrderPlaced.v1").
    pub event_type: String,

    /// The aggregate (stream) this event belongs to.
    pub aggregate_id: AggregateId,

    /// Wall-clock timestamp when the event occurred, set at construction.
    pub occurred_at: DateTime<Utc>,

    /// Correlation/causation metadata.
    pub metadata: EventMetadata,

    /// The bincode-serialized domain event payload.
    pub payload: Vec<u8>,
}

impl SerializedEvent {
    /// Create a new serialized event envelope from raw parts.
    #[must_use]
    pub fn new(
        event_type: String,
        aggregate_id: AggregateId,
        occurred_at: DateTime<Utc>,
        metadata: EventMetadata,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            aggregate_id,
            occurred_at,
            metadata,
            payload,
        }
    }

    /// Create a serialized event from an `Event` trait object.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        aggregate_id: AggregateId,
        occurred_at: DateTime<Utc>,
        metadata: EventMetadata,
    ) -> Result<Self, EventError> {
        Ok(Self::new(
            event.event_type().to_string(),
            aggregate_id,
            occurred_at,
            metadata,
            event.to_bytes()?,
        ))
    }

    /// Deserialize the payload into a concrete domain event type.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the payload doesn't match `E`.
    pub fn deserialize_payload<E: Event + DeserializeOwned>(&self) -> Result<E, EventError> {
        E::from_bytes(&self.payload)
    }

    /// Reconstruct this event's concrete value using `registry`, falling back
    /// to a [`PlaceholderEvent`] when `event_type` has no registered
    /// deserializer.
    ///
    /// Use this when the caller doesn't know the concrete event type at
    /// compile time (generic tooling, audit logging); a handler that already
    /// knows which types it cares about should call [`Self::deserialize_payload`]
    /// directly instead.
    #[must_use]
    pub fn resolve(&self, registry: &EventDeserializerRegistry) -> ResolvedEvent {
        registry.resolve(self)
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ id: {}, type: {}, aggregate: {}, size: {} bytes }}",
            self.event_id,
            self.event_type,
            self.aggregate_id,
            self.payload.len()
        )
    }
}

/// Identity and metadata of an event whose payload couldn't be reconstructed
/// into a concrete Rust type, because no deserializer is registered for its
/// `event_type` (§4.1, §6).
///
/// Everything that doesn't depend on knowing the payload's shape survives:
/// the event is still identifiable, attributable to its aggregate, and
/// traceable through its correlation/causation metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceholderEvent {
    /// The event's own identifier.
    pub event_id: Uuid,
    /// The unrecognized type tag.
    pub event_type: String,
    /// The aggregate (stream) this event belongs to.
    pub aggregate_id: AggregateId,
    /// Wall-clock timestamp when the event occurred.
    pub occurred_at: DateTime<Utc>,
    /// Correlation/causation metadata, still readable even when the payload isn't.
    pub metadata: EventMetadata,
}

impl From<&SerializedEvent> for PlaceholderEvent {
    fn from(event: &SerializedEvent) -> Self {
        Self {
            event_id: event.event_id,
            event_type: event.event_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            occurred_at: event.occurred_at,
            metadata: event.metadata.clone(),
        }
    }
}

/// The outcome of resolving a [`SerializedEvent`] through an
/// [`EventDeserializerRegistry`].
pub enum ResolvedEvent {
    /// The payload was decoded into a concrete event value. Downcast with
    /// [`Any::downcast_ref`] to the type registered for this `event_type`.
    Known(Box<dyn Any + Send + Sync>),
    /// No deserializer was registered for this `event_type` (or it failed),
    /// so only identity and metadata survived.
    Unknown(PlaceholderEvent),
}

type BoxedDeserializer = dyn Fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>, EventError> + Send + Sync;

/// Maps `event_type` strings to the deserializer for that event's concrete
/// Rust type, so generic tooling (replay inspection, audit logging) can turn
/// a store's opaque `(event_type, payload)` pair back into a typed value
/// without the caller hard-coding every event type up front.
///
/// Populated once at startup by the application (§6), the same way a
/// `ToolRegistry` is populated with its tools before first use.
#[derive(Clone, Default)]
pub struct EventDeserializerRegistry {
    deserializers: Arc<RwLock<HashMap<&'static str, Arc<BoxedDeserializer>>>>,
}

impl EventDeserializerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the deserializer for `event_type`. Registering the same
    /// `event_type` twice replaces the prior deserializer.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (indicates a panic in another
    /// thread while holding it).
    pub fn register<E>(&self, event_type: &'static str)
    where
        E: Event + DeserializeOwned + Send + Sync + 'static,
    {
        let deserializer: Arc<BoxedDeserializer> =
            Arc::new(|bytes: &[u8]| E::from_bytes(bytes).map(|e| Box::new(e) as Box<dyn Any + Send + Sync>));
        self.deserializers
            .write()
            .expect("event deserializer registry lock poisoned")
            .insert(event_type, deserializer);
    }

    /// Resolve `event` via its registered deserializer, or a [`PlaceholderEvent`]
    /// if none is registered for its `event_type` (or decoding fails).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (indicates a panic in another
    /// thread while holding it).
    #[must_use]
    pub fn resolve(&self, event: &SerializedEvent) -> ResolvedEvent {
        let deserializers = self.deserializers.read().expect("event deserializer registry lock poisoned");
        match deserializers.get(event.event_type.as_str()) {
            Some(deserializer) => match deserializer(&event.payload) {
                Ok(value) => ResolvedEvent::Known(value),
                Err(_) => ResolvedEvent::Unknown(PlaceholderEvent::from(event)),
            },
            None => ResolvedEvent::Unknown(PlaceholderEvent::from(event)),
        }
    }
}
