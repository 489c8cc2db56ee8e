//! Postgres-backed storage for an append-only event-sourcing runtime.
//!
//! This crate implements the [`eventflow_core`] storage traits on top of a
//! `sqlx::PgPool`:
//!
//! - [`PostgresEventStore`] — the append-only event log (`EventStore`)
//! - [`PostgresSnapshotStore`] — per-aggregate state snapshots (`SnapshotStore`)
//! - [`PostgresCheckpointStore`] — per-projection durable progress markers (`CheckpointStore`)
//! - [`DeadLetterQueue`] — events a projection handler could not apply
//!
//! Each backend owns a single table and exposes a `migrate()` method that
//! creates it if missing; callers are expected to share one `PgPool` across
//! backends that live in the same database.
//!
//! # Example
//!
//! ```ignore
//! use eventflow_postgres::PostgresEventStore;
//! use sqlx::postgres::PgPoolOptions;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPoolOptions::new().connect("postgres://localhost/mydb").await?;
//!     let store = PostgresEventStore::new(pool);
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint_store;
pub mod dead_letter_queue;
pub mod event_store;
pub mod snapshot_store;

pub use checkpoint_store::PostgresCheckpointStore;
pub use dead_letter_queue::{DeadLetterQueue, DlqStatus, FailedEvent};
pub use event_store::PostgresEventStore;
pub use snapshot_store::PostgresSnapshotStore;
