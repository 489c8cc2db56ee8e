//! Postgres-backed [`CheckpointStore`].
//!
//! One row per projection name. A missing row means "never checkpointed",
//! which [`CheckpointStore::get`] reports as [`GlobalPosition::START`]
//! rather than an error — a brand-new projection is a normal state.

use eventflow_core::checkpoint::{CheckpointError, CheckpointStore};
use eventflow_core::position::GlobalPosition;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

fn to_backend_error(error: sqlx::Error) -> CheckpointError {
    CheckpointError::BackendError(error.to_string())
}

/// A durable [`CheckpointStore`] backed by a `PgPool`.
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
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

    /// Create the `projection_checkpoints` table if it doesn't already exist.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` on connection or DDL failure.
    pub async fn migrate(&self) -> sqlx::Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS projection_checkpoints (
                projection_name TEXT PRIMARY KEY,
                position BIGINT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl CheckpointStore for PostgresCheckpointStore {
    fn save(
        &self,
        projection_name: &str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)]
            let position = position.value() as i64;
            sqlx::query(
                r"
                INSERT INTO projection_checkpoints (projection_name, position)
                VALUES ($1, $2)
                ON CONFLICT (projection_name) DO UPDATE
                SET position = EXCLUDED.position, updated_at = now()
                ",
            )
            .bind(&projection_name)
            .bind(position)
            .execute(&self.pool)
            .await
            .map_err(to_backend_error)?;
            Ok(())
        })
    }

    fn get(
        &self,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<GlobalPosition, CheckpointError>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            let position: Option<i64> =
                sqlx::query_scalar("SELECT position FROM projection_checkpoints WHERE projection_name = $1")
                    .bind(&projection_name)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(to_backend_error)?;

            Ok(position.map_or(GlobalPosition::START, |p| GlobalPosition::new(u64::try_from(p).unwrap_or(0))))
        })
    }

    fn delete(&self, projection_name: &str) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            sqlx::query("DELETE FROM projection_checkpoints WHERE projection_name = $1")
                .bind(&projection_name)
                .execute(&self.pool)
                .await
                .map_err(to_backend_error)?;
            Ok(())
        })
    }

    fn list(&self) -> Pin<Box<dyn Future<Output = Result<HashMap<String, GlobalPosition>, CheckpointError>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT projection_name, position FROM projection_checkpoints")
                .fetch_all(&self.pool)
                .await
                .map_err(to_backend_error)?;

            Ok(rows
                .iter()
                .map(|row| {
                    let name: String = row.get("projection_name");
                    let position: i64 = row.get("position");
                    (name, GlobalPosition::new(u64::try_from(position).unwrap_or(0)))
                })
                .collect())
        })
    }
}
