//! Checkpoint storage: durable per-projection progress markers (§4.6).
//!
//! A checkpoint is the global position a projection has fully processed up
//! to. The runner saves it only after `Projection::handle` succeeds, never
//! before — this is what makes "advance checkpoint only on success" the
//! at-least-once delivery guarantee rather than at-most-once (§8).

use crate::position::GlobalPosition;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from checkpoint store operations.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Connectivity, timeout, or other backend failure.
    #[error("backend error: {0}")]
    BackendError(String),
}

/// Durable storage for per-projection checkpoints.
///
/// # Dyn Compatibility
///
/// Uses `Pin<Box<dyn Future>>` returns to support trait objects
/// (`Arc<dyn CheckpointStore>`), matching [`crate::event_store::EventStore`].
pub trait CheckpointStore: Send + Sync {
    /// Persist `position` as the checkpoint for `projection_name`, overwriting
    /// any prior value.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] on backend failure.
    fn save(
        &self,
        projection_name: &str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>>;

    /// The last saved checkpoint for `projection_name`, or
    /// [`GlobalPosition::START`] if none has ever been saved. A missing
    /// checkpoint is a normal "new projection" state, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] on backend failure.
    fn get(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GlobalPosition, CheckpointError>> + Send + '_>>;

    /// Remove the checkpoint for `projection_name`, used before a full rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] on backend failure.
    fn delete(&self, projection_name: &str) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>>;

    /// All known checkpoints, keyed by projection name. Used by operational
    /// tooling to report projection lag across the fleet.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] on backend failure.
    fn list(&self) -> Pin<Box<dyn Future<Output = Result<HashMap<String, GlobalPosition>, CheckpointError>> + Send + '_>>;
}
