//! # Eventflow Core
//!
//! Core traits and types for an append-only event-sourcing runtime: domain
//! events, aggregates, an event store abstraction, snapshotting, a
//! repository that ties them together, and the read-side projection
//! primitives built on top.
//!
//! ## Core Concepts
//!
//! - [`event`]: the `Event` trait and the `SerializedEvent` wire envelope.
//! - [`stream`]: `AggregateId` and `Version`, the per-stream coordinates.
//! - [`position`]: `GlobalPosition`, the cross-stream coordinate.
//! - [`event_store`]: `EventStore`, the append-only log abstraction.
//! - [`snapshot`] / [`snapshot_policy`]: optional reconstruction shortcuts.
//! - [`aggregate`]: `Aggregate<S, A>`, domain state plus replay/raise bookkeeping.
//! - [`repository`]: `Repository<S, A>`, the load/save entry point for aggregates.
//! - [`projection`] / [`checkpoint`] / [`replay`]: the read side of CQRS.
//!
//! ## Architecture Principles
//!
//! - The event log is the source of truth; snapshots and projections are
//!   derived, disposable, and rebuildable from it.
//! - Traits at storage boundaries (`EventStore`, `SnapshotStore`,
//!   `CheckpointStore`, `ProjectionStore`) use `Pin<Box<dyn Future>>` returns
//!   so they stay usable as `Arc<dyn Trait>` objects.
//! - Domain logic (an `Applier<S>`) is a plain function or closure, not a
//!   trait object hierarchy — no inheritance, no downcasting.
//!
//! ## Example
//!
//! ```ignore
//! use eventflow_core::aggregate::{Aggregate, AggregateError};
//! use eventflow_core::event::{Event, EventMetadata, SerializedEvent};
//! use eventflow_core::stream::AggregateId;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum AccountEvent {
//!     Opened { owner: String },
//! }
//!
//! impl Event for AccountEvent {
//!     fn event_type(&self) -> &'static str {
//!         "Account.Opened.v1"
//!     }
//! }
//!
//! #[derive(Clone, Debug, Default)]
//! struct AccountState {
//!     owner: String,
//! }
//!
//! fn apply(state: &mut AccountState, event: &SerializedEvent) -> Result<(), AggregateError> {
//!     Ok(())
//! }
//!
//! let mut account = Aggregate::new(AggregateId::new("acct-1"), AccountState::default(), apply);
//! account.raise(&AccountEvent::Opened { owner: "alice".into() }, EventMetadata::new("corr-1")).unwrap();
//! ```

pub mod aggregate;
pub mod checkpoint;
pub mod environment;
pub mod event;
pub mod event_store;
pub mod position;
pub mod projection;
pub mod repository;
pub mod replay;
pub mod snapshot;
pub mod snapshot_policy;
pub mod stream;

#[cfg(test)]
mod test_support;

// Re-export commonly used types.
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
