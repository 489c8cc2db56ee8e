//! Snapshot store: latest serialized aggregate state, keyed by aggregate id.
//!
//! Snapshots are an optimization, never a source of truth (§4.2): the event
//! store alone is authoritative. A corrupt or undeserializable snapshot must
//! cause the repository to fall back to full replay rather than fail the
//! caller — see [`crate::repository::Repository::get_by_id`].

use crate::stream::{AggregateId, Version};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from snapshot store operations.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Failed to serialize aggregate state for storage. Logged and swallowed
    /// by the repository on save (§4.3); never fatal to the underlying append.
    #[error("snapshot serialization error: {0}")]
    SerializationError(String),

    /// Stored snapshot bytes could not be deserialized. Treated by the
    /// repository as "no usable snapshot", triggering full replay.
    #[error("snapshot deserialization error: {0}")]
    DeserializationError(String),

    /// Connectivity, timeout, or other backend failure.
    #[error("backend error: {0}")]
    BackendError(String),
}

/// A point-in-time serialized aggregate state.
///
/// `version` is the stream version the state reflects; it must correspond to
/// a previously appended event. At most one snapshot exists per `aggregate_id`
/// (latest-wins upsert).
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// The aggregate this snapshot captures.
    pub aggregate_id: AggregateId,

    /// Classifier for the owning aggregate (e.g. `"Account"`).
    pub aggregate_type: String,

    /// The stream version this state reflects.
    pub version: Version,

    /// Opaque serialized aggregate state (bincode, by convention).
    pub state: Vec<u8>,

    /// Optional application-defined metadata (JSON).
    pub metadata: Option<Value>,

    /// When this snapshot was persisted.
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Construct a new snapshot with the current time as `created_at`.
    #[must_use]
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: Vec<u8>,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            state,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Storage backend for aggregate snapshots.
///
/// # Dyn Compatibility
///
/// Uses `Pin<Box<dyn Future>>` returns to support trait objects
/// (`Arc<dyn SnapshotStore>`), matching [`crate::event_store::EventStore`].
pub trait SnapshotStore: Send + Sync {
    /// Upsert a snapshot by `aggregate_id`; the latest version overwrites any prior snapshot.
    ///
    /// # Errors
    ///
    /// - `SerializationError`: the caller should already have serialized `state`; this
    ///   variant exists for backends that re-encode on write (e.g. compression).
    /// - `BackendError`: connectivity or query failure.
    fn save(
        &self,
        snapshot: Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>>;

    /// Load the latest snapshot for an aggregate, if any.
    ///
    /// # Errors
    ///
    /// - `DeserializationError`: the stored snapshot exists but could not be read back;
    ///   callers (the repository) should treat this the same as `Ok(None)` and fall back
    ///   to full replay rather than propagate the error.
    /// - `BackendError`: connectivity or query failure.
    fn get(
        &self,
        aggregate_id: AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>, SnapshotError>> + Send + '_>>;

    /// Remove snapshots for `aggregate_id` whose `version` is strictly less than `version`.
    ///
    /// # Errors
    ///
    /// - `BackendError`: connectivity or query failure.
    fn delete_before(
        &self,
        aggregate_id: AggregateId,
        version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_new_sets_fields() {
        let snapshot = Snapshot::new(
            AggregateId::new("account-1"),
            "Account",
            Version::new(20),
            vec![1, 2, 3],
            None,
        );

        assert_eq!(snapshot.aggregate_id, AggregateId::new("account-1"));
        assert_eq!(snapshot.aggregate_type, "Account");
        assert_eq!(snapshot.version, Version::new(20));
        assert_eq!(snapshot.state, vec![1, 2, 3]);
    }

    #[test]
    fn deserialization_error_display() {
        let error = SnapshotError::DeserializationError("corrupt bytes".to_string());
        assert!(format!("{error}").contains("corrupt bytes"));
    }
}
