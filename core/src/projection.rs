//! Projections: the read side of CQRS, built by folding stored events into
//! denormalized views (§4.7).
//!
//! A [`Projection`] is deliberately narrow: given one [`StoredEvent`] at a
//! time, update whatever read model it owns. Tailing the log, checkpointing
//! progress, and retrying failures is the [`crate::replay`] module's and the
//! projection runner's job, not the projection's.

use crate::event_store::StoredEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from projection operations.
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// The read-model store rejected a read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// The event payload could not be decoded into what the projection expects.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Handling the event violated a projection-local invariant.
    #[error("event processing error: {0}")]
    EventProcessing(String),

    /// Anything else; callers should prefer a more specific variant when possible.
    #[error("projection error: {0}")]
    Other(String),
}

/// A read model fed by one event at a time.
///
/// # Idempotency
///
/// `handle` may be called more than once for the same event (at-least-once
/// delivery, §4.7, §8): implementations must be idempotent, typically by
/// keying writes on the event's own identity rather than blindly appending.
pub trait Projection: Send + Sync {
    /// Unique name, used as the checkpoint key (§4.6).
    fn name(&self) -> &str;

    /// Fold one event into the read model.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the read model cannot be updated. The
    /// runner does not advance this projection's checkpoint past a failing
    /// event (§4.7) — progress resumes from the same event on the next tick.
    fn handle(&self, event: &StoredEvent) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>>;

    /// Drop this projection's read-model state in preparation for a full
    /// replay from position zero. Default: a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if clearing storage fails.
    fn reset(&self) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// Key/value storage backend for a projection's read model.
///
/// Deliberately schema-agnostic: a projection serializes its own view
/// however it likes (JSON, bincode) and stores it under an application
/// key. Distinct from the event store and from [`crate::checkpoint::CheckpointStore`].
pub trait ProjectionStore: Send + Sync {
    /// Upsert `data` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn save(&self, key: &str, data: &[u8]) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>>;

    /// Fetch the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, ProjectionError>> + Send + '_>>;

    /// Remove the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>>;

    /// Whether `key` currently has a stored value.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn exists<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<bool, ProjectionError>> + Send + '_>> {
        Box::pin(async move { Ok(self.get(key).await?.is_some()) })
    }
}
