//! Postgres-backed [`SnapshotStore`].
//!
//! One row per aggregate, latest-wins upsert. Snapshots are an optimization
//! only — a missing or corrupt row is never fatal to the repository, which
//! falls back to full replay (§4.2).

use eventflow_core::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use eventflow_core::stream::{AggregateId, Version};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;

fn to_backend_error(error: sqlx::Error) -> SnapshotError {
    SnapshotError::BackendError(error.to_string())
}

/// A durable [`SnapshotStore`] backed by a `PgPool`.
pub struct PostgresSnapshotStore {
    pool: PgPool,
}

impl PostgresSnapshotStore {
    /// Wrap an existing connection pool. Call [`Self::migrate`] before first use.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `snapshots` table if it doesn't already exist.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` on connection or DDL failure.
    pub async fn migrate(&self) -> sqlx::Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS snapshots (
                aggregate_id TEXT PRIMARY KEY,
                aggregate_type TEXT NOT NULL,
                version BIGINT NOT NULL,
                state BYTEA NOT NULL,
                metadata JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SnapshotStore for PostgresSnapshotStore {
    fn save(
        &self,
        snapshot: Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let version = snapshot.version.value() as i64;

            sqlx::query(
                r"
                INSERT INTO snapshots (aggregate_id, aggregate_type, version, state, metadata)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (aggregate_id) DO UPDATE
                SET aggregate_type = EXCLUDED.aggregate_type,
                    version = EXCLUDED.version,
                    state = EXCLUDED.state,
                    metadata = EXCLUDED.metadata,
                    created_at = now()
                ",
            )
            .bind(snapshot.aggregate_id.as_str())
            .bind(&snapshot.aggregate_type)
            .bind(version)
            .bind(&snapshot.state)
            .bind(&snapshot.metadata)
            .execute(&self.pool)
            .await
            .map_err(to_backend_error)?;

            Ok(())
        })
    }

    fn get(
        &self,
        aggregate_id: AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>, SnapshotError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM snapshots WHERE aggregate_id = $1")
                .bind(aggregate_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(to_backend_error)?;

            let Some(row) = row else {
                return Ok(None);
            };

            let version: i64 = row.get("version");
            Ok(Some(Snapshot {
                aggregate_id,
                aggregate_type: row.get("aggregate_type"),
                version: Version::new(u64::try_from(version).unwrap_or(0)),
                state: row.get("state"),
                metadata: row.get("metadata"),
                created_at: row.get("created_at"),
            }))
        })
    }

    fn delete_before(
        &self,
        aggregate_id: AggregateId,
        version: Version,
    ) -> Pin<Box<dyn Future<Output = Result<(), SnapshotError>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let version = version.value() as i64;
            sqlx::query("DELETE FROM snapshots WHERE aggregate_id = $1 AND version < $2")
                .bind(aggregate_id.as_str())
                .bind(version)
                .execute(&self.pool)
                .await
                .map_err(to_backend_error)?;
            Ok(())
        })
    }
}
