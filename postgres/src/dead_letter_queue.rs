//! Dead letter queue for events a projection handler could not apply.
//!
//! Supplements the checkpoint contract (§4.6, §4.7): the runner never
//! advances a projection's checkpoint past a failing event, with or without a
//! dead letter queue configured. Routing the event here after the retry
//! budget is exhausted does not change that — it only preserves the failure
//! for investigation and manual reprocessing. The projection stays stuck at
//! that position, retrying the same event on every subsequent pass, until an
//! operator resolves it (fixes the handler and lets replay pick it back up,
//! or marks the entry resolved/discarded after handling it out of band).

use chrono::{DateTime, Utc};
use eventflow_core::checkpoint::CheckpointError;
use eventflow_core::event::{EventMetadata, SerializedEvent};
use sqlx::{PgPool, Row};

/// Status of an entry in the dead letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqStatus {
    /// Pending investigation or manual reprocessing.
    Pending,
    /// Currently being reprocessed.
    Processing,
    /// Reprocessed successfully.
    Resolved,
    /// Permanently discarded; will not be retried.
    Discarded,
}

impl DlqStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse a status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] if `s` doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, CheckpointError> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            other => Err(CheckpointError::BackendError(format!("invalid dlq status: {other}"))),
        }
    }
}

/// A dead-lettered event plus its failure history.
#[derive(Debug, Clone)]
pub struct FailedEvent {
    /// Unique identifier for this dead letter queue entry.
    pub id: i64,
    /// The projection that failed to handle this event.
    pub projection_name: String,
    /// The event that could not be applied.
    pub event: SerializedEvent,
    /// Most recent handler error message.
    pub error_message: String,
    /// How many times processing was retried before giving up.
    pub retry_count: i32,
    /// When this event first failed.
    pub first_failed_at: DateTime<Utc>,
    /// When this event most recently failed.
    pub last_failed_at: DateTime<Utc>,
    /// Current status.
    pub status: DlqStatus,
    /// Who or what resolved or discarded the entry.
    pub resolved_by: Option<String>,
    /// Free-text notes about the resolution.
    pub resolution_notes: Option<String>,
}

/// Postgres-backed dead letter queue, keyed by `(projection_name, event_id)`.
pub struct DeadLetterQueue {
    pool: PgPool,
}

impl DeadLetterQueue {
    /// Wrap an existing connection pool. Call [`Self::migrate`] before first use.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `projection_dead_letters` table if it doesn't already exist.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` on connection or DDL failure.
    pub async fn migrate(&self) -> sqlx::Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS projection_dead_letters (
                id BIGSERIAL PRIMARY KEY,
                projection_name TEXT NOT NULL,
                event_id UUID NOT NULL,
                event_type TEXT NOT NULL,
                aggregate_id TEXT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                metadata JSONB NOT NULL,
                payload BYTEA NOT NULL,
                error_message TEXT NOT NULL,
                retry_count INT NOT NULL,
                first_failed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                last_failed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                status TEXT NOT NULL DEFAULT 'pending',
                resolved_by TEXT,
                resolution_notes TEXT,
                UNIQUE (projection_name, event_id)
            );
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a handler failure, upserting on `(projection_name, event_id)` so
    /// repeated failures for the same event bump `retry_count` instead of
    /// creating duplicate entries.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] if the insert fails.
    pub async fn record_failure(
        &self,
        projection_name: &str,
        event: &SerializedEvent,
        error_message: &str,
    ) -> Result<i64, CheckpointError> {
        let metadata_json = event
            .metadata
            .to_json()
            .map_err(|e| CheckpointError::BackendError(e.to_string()))?;

        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO projection_dead_letters
                (projection_name, event_id, event_type, aggregate_id, occurred_at, metadata, payload, error_message, retry_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)
            ON CONFLICT (projection_name, event_id) DO UPDATE
            SET error_message = EXCLUDED.error_message,
                retry_count = projection_dead_letters.retry_count + 1,
                last_failed_at = now()
            RETURNING id
            ",
        )
        .bind(projection_name)
        .bind(event.event_id)
        .bind(&event.event_type)
        .bind(event.aggregate_id.as_str())
        .bind(event.occurred_at)
        .bind(metadata_json)
        .bind(&event.payload)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CheckpointError::BackendError(e.to_string()))?;

        tracing::warn!(dlq_id = id, projection_name, event_type = %event.event_type, error_message, "event dead-lettered");
        metrics::counter!("projection.dead_letters.total", "projection" => projection_name.to_string()).increment(1);

        Ok(id)
    }

    /// List pending entries for a projection, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] if the query fails.
    pub async fn list_pending(&self, projection_name: &str, limit: i64) -> Result<Vec<FailedEvent>, CheckpointError> {
        let rows = sqlx::query(
            r"
            SELECT * FROM projection_dead_letters
            WHERE projection_name = $1 AND status = 'pending'
            ORDER BY first_failed_at ASC
            LIMIT $2
            ",
        )
        .bind(projection_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CheckpointError::BackendError(e.to_string()))?;

        rows.iter().map(Self::row_to_failed_event).collect()
    }

    /// Mark an entry as resolved after successful manual reprocessing.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] if the update fails.
    pub async fn mark_resolved(&self, id: i64, resolved_by: &str, notes: Option<&str>) -> Result<(), CheckpointError> {
        sqlx::query(
            r"
            UPDATE projection_dead_letters
            SET status = 'resolved', resolved_by = $1, resolution_notes = $2
            WHERE id = $3
            ",
        )
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::BackendError(e.to_string()))?;

        tracing::info!(dlq_id = id, resolved_by, "dead letter resolved");
        Ok(())
    }

    /// Mark an entry as permanently discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::BackendError`] if the update fails.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), CheckpointError> {
        sqlx::query(
            r"
            UPDATE projection_dead_letters
            SET status = 'discarded', resolution_notes = $1
            WHERE id = $2
            ",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::BackendError(e.to_string()))?;

        tracing::warn!(dlq_id = id, reason, "dead letter discarded");
        Ok(())
    }

    fn row_to_failed_event(row: &sqlx::postgres::PgRow) -> Result<FailedEvent, CheckpointError> {
        let metadata_json: serde_json::Value = row.get("metadata");
        let metadata = EventMetadata::from_json(metadata_json).map_err(|e| CheckpointError::BackendError(e.to_string()))?;
        let status_str: String = row.get("status");

        Ok(FailedEvent {
            id: row.get("id"),
            projection_name: row.get("projection_name"),
            event: SerializedEvent {
                event_id: row.get("event_id"),
                event_type: row.get("event_type"),
                aggregate_id: eventflow_core::stream::AggregateId::new(row.get::<String, _>("aggregate_id")),
                occurred_at: row.get("occurred_at"),
                metadata,
                payload: row.get("payload"),
            },
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            first_failed_at: row.get("first_failed_at"),
            last_failed_at: row.get("last_failed_at"),
            status: DlqStatus::parse(&status_str)?,
            resolved_by: row.get("resolved_by"),
            resolution_notes: row.get("resolution_notes"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlq_status_roundtrip() {
        for status in [DlqStatus::Pending, DlqStatus::Processing, DlqStatus::Resolved, DlqStatus::Discarded] {
            let parsed = DlqStatus::parse(status.as_str()).unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn dlq_status_invalid() {
        assert!(DlqStatus::parse("invalid").is_err());
    }
}
