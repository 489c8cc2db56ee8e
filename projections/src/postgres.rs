//! `PostgreSQL`-backed generic key/value read-model storage.
//!
//! Complements [`eventflow_postgres::PostgresCheckpointStore`], which tracks
//! per-projection progress: this module stores the projection's actual
//! materialized state. Custom, queryable read models are expected to define
//! their own tables and implement [`ProjectionStore`] (or skip it entirely
//! and write straight to their table from inside [`Projection::handle`]);
//! [`PostgresProjectionStore`] is the generic fallback for projections that
//! just need a key keyed to an opaque blob.
//!
//! # CQRS Separation
//!
//! ```text
//! Write Side (Event Store)          Read Side (Projections)
//! ┌─────────────────────┐          ┌─────────────────────┐
//! │  PostgreSQL DB #1    │          │  PostgreSQL DB #2    │
//! │  events, snapshots   │   →→→    │  projection_data     │
//! └─────────────────────┘  events  └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use eventflow_projections::postgres::PostgresProjectionStore;
//!
//! let store = PostgresProjectionStore::new(pool, "order_summaries".to_string());
//! store.migrate().await?;
//! store.save("order:123", &data).await?;
//! ```

use eventflow_core::projection::{ProjectionError, ProjectionStore};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;

/// Generic key/value projection storage backed by a single Postgres table.
///
/// The table name is supplied by the caller, not hardcoded, since a single
/// database commonly hosts several independent read models side by side.
#[derive(Clone)]
pub struct PostgresProjectionStore {
    pool: PgPool,
    table_name: String,
}

impl PostgresProjectionStore {
    /// Wrap an existing connection pool, targeting `table_name` for storage.
    #[must_use]
    pub const fn new(pool: PgPool, table_name: String) -> Self {
        Self { pool, table_name }
    }

    /// Create the backing table if it doesn't already exist.
    ///
    /// The table name is caller-controlled (not user input), so it is safe to
    /// interpolate directly into the DDL statement.
    ///
    /// # Errors
    ///
    /// Returns the underlying `sqlx::Error` on connection or DDL failure.
    pub async fn migrate(&self) -> sqlx::Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                data BYTEA NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.table_name
        );
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    /// Access the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The table this store reads and writes.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl ProjectionStore for PostgresProjectionStore {
    fn save(&self, key: &str, data: &[u8]) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let key = key.to_string();
        let data = data.to_vec();
        Box::pin(async move {
            let query = format!(
                "INSERT INTO {} (key, data, updated_at) VALUES ($1, $2, now())
                 ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
                self.table_name
            );
            sqlx::query(&query)
                .bind(&key)
                .bind(&data)
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, ProjectionError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let query = format!("SELECT data FROM {} WHERE key = $1", self.table_name);
            let result: Option<(Vec<u8>,)> = sqlx::query_as(&query)
                .bind(&key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            Ok(result.map(|(data,)| data))
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let query = format!("DELETE FROM {} WHERE key = $1", self.table_name);
            sqlx::query(&query)
                .bind(&key)
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<bool, ProjectionError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE key = $1)", self.table_name);
            let (exists,): (bool,) = sqlx::query_as(&query)
                .bind(&key)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            Ok(exists)
        })
    }
}
