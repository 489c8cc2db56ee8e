//! Postgres-backed [`EventStore`].
//!
//! Schema (see [`PostgresEventStore::migrate`]): one `events` table keyed by
//! `(aggregate_id, version)`, with a `BIGSERIAL` primary key doubling as the
//! global position. Optimistic concurrency is enforced with a per-aggregate
//! advisory lock held for the transaction, so the very first append to a
//! brand-new stream is race-free too (a plain `SELECT MAX(version) ... FOR
//! UPDATE` locks nothing when no rows exist yet).

use chrono::{DateTime, Utc};
use eventflow_core::event::{EventMetadata, SerializedEvent};
use eventflow_core::event_store::{EventStore, EventStoreError, StoredEvent, StoredEventStream};
use eventflow_core::position::GlobalPosition;
use eventflow_core::stream::{AggregateId, Version};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;

fn to_backend_error(error: sqlx::Error) -> EventStoreError {
    EventStoreError::BackendError(error.to_string())
}

/// A durable [`EventStore`] backed by a `PgPool`.
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Wrap an existing connection pool. Call [`Self::migrate`] before first use.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (e.g. to share it with a snapshot store).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `events` table and its indexes if they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` on connection or DDL failure.
    pub async fn migrate(&self) -> sqlx::Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS events (
                position BIGSERIAL PRIMARY KEY,
                event_id UUID NOT NULL,
                aggregate_id TEXT NOT NULL,
                aggregate_type TEXT NOT NULL,
                version BIGINT NOT NULL,
                event_type TEXT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                metadata JSONB NOT NULL,
                payload BYTEA NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (aggregate_id, version)
            );

            CREATE INDEX IF NOT EXISTS idx_events_aggregate_id ON events (aggregate_id);
            CREATE INDEX IF NOT EXISTS idx_events_type_occurred ON events (event_type, occurred_at);
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_stored_event(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
        let metadata_json: serde_json::Value = row.get("metadata");
        let metadata = EventMetadata::from_json(metadata_json)
            .map_err(|e| EventStoreError::DeserializationError(e.to_string()))?;

        let event = SerializedEvent {
            event_id: row.get("event_id"),
            event_type: row.get("event_type"),
            aggregate_id: AggregateId::new(row.get::<String, _>("aggregate_id")),
            occurred_at: row.get("occurred_at"),
            metadata,
            payload: row.get("payload"),
        };

        let version: i64 = row.get("version");
        let position: i64 = row.get("position");

        Ok(StoredEvent {
            event,
            version: Version::new(u64::try_from(version).unwrap_or(0)),
            position: GlobalPosition::new(u64::try_from(position).unwrap_or(0)),
            aggregate_type: row.get("aggregate_type"),
            created_at: row.get("created_at"),
        })
    }
}

impl EventStore for PostgresEventStore {
    fn append_events(
        &self,
        aggregate_id: AggregateId,
        expected_version: Version,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            if events.is_empty() {
                return Err(EventStoreError::InvalidVersion(
                    "append_events requires at least one event".to_string(),
                ));
            }
            if events.iter().any(|e| e.aggregate_id != aggregate_id) {
                return Err(EventStoreError::InvalidVersion(
                    "all events in a batch must share the same aggregate_id".to_string(),
                ));
            }

            let mut tx = self.pool.begin().await.map_err(to_backend_error)?;

            // Postgres's own hashtext() avoids pulling in a hashing crate just
            // for this, and guarantees the lock key is stable across processes.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(aggregate_id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(to_backend_error)?;

            let current_version: i64 =
                sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM events WHERE aggregate_id = $1")
                    .bind(aggregate_id.as_str())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(to_backend_error)?;

            #[allow(clippy::cast_possible_wrap)]
            if current_version != expected_version.value() as i64 {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual: Version::new(u64::try_from(current_version).unwrap_or(0)),
                });
            }

            for (i, event) in events.iter().enumerate() {
                #[allow(clippy::cast_possible_wrap)]
                let version = expected_version.value() as i64 + i as i64 + 1;
                let metadata_json = event
                    .metadata
                    .to_json()
                    .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

                sqlx::query(
                    r"
                    INSERT INTO events (event_id, aggregate_id, aggregate_type, version, event_type, occurred_at, metadata, payload)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ",
                )
                .bind(event.event_id)
                .bind(aggregate_id.as_str())
                .bind(aggregate_type_of(&event.event_type))
                .bind(version)
                .bind(&event.event_type)
                .bind(event.occurred_at)
                .bind(metadata_json)
                .bind(&event.payload)
                .execute(&mut *tx)
                .await
                .map_err(to_backend_error)?;
            }

            tx.commit().await.map_err(to_backend_error)?;

            #[allow(clippy::cast_possible_wrap)]
            let new_version = expected_version.value() as i64 + events.len() as i64;
            Ok(Version::new(u64::try_from(new_version).unwrap_or(0)))
        })
    }

    fn get_events(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let from = from_version.value() as i64;
            let rows = sqlx::query(
                "SELECT * FROM events WHERE aggregate_id = $1 AND version >= $2 ORDER BY version",
            )
            .bind(aggregate_id.as_str())
            .bind(from)
            .fetch_all(&self.pool)
            .await
            .map_err(to_backend_error)?;

            if rows.is_empty() && from_version.value() > 0 {
                return Err(EventStoreError::StreamNotFound(aggregate_id));
            }

            rows.iter().map(Self::row_to_stored_event).collect()
        })
    }

    fn get_events_by_type(
        &self,
        event_type: &str,
        from_timestamp: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        let event_type = event_type.to_string();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT * FROM events WHERE event_type = $1 AND occurred_at >= $2 ORDER BY position",
            )
            .bind(&event_type)
            .bind(from_timestamp)
            .fetch_all(&self.pool)
            .await
            .map_err(to_backend_error)?;

            rows.iter().map(Self::row_to_stored_event).collect()
        })
    }

    fn get_all(&self, from_position: GlobalPosition) -> StoredEventStream<'_> {
        let pool = self.pool.clone();
        Box::pin(async_stream::try_stream! {
            #[allow(clippy::cast_possible_wrap)]
            let from = from_position.value() as i64;
            let rows = sqlx::query("SELECT * FROM events WHERE position >= $1 ORDER BY position")
                .bind(from)
                .fetch_all(&pool)
                .await
                .map_err(to_backend_error)?;

            for row in &rows {
                yield Self::row_to_stored_event(row)?;
            }
        })
    }
}

/// Events don't carry an `aggregate_type` field on the wire; it is derived
/// from the event type's namespace prefix (`"Account.Opened.v1"` → `"Account"`).
fn aggregate_type_of(event_type: &str) -> &str {
    event_type.split('.').next().unwrap_or(event_type)
}
