//! SQLite-backed resolution cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::error_handling::DatabaseError;
use crate::resolve::{RedirectResolution, ResolutionCache};

/// Resolutions stored as JSON payloads in `resolver_cache`.
pub struct SqliteResolutionCache {
    pool: Arc<SqlitePool>,
    clock: Arc<dyn Clock>,
}

impl SqliteResolutionCache {
    pub fn new(pool: Arc<SqlitePool>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl ResolutionCache for SqliteResolutionCache {
    async fn get(&self, key: &str) -> Result<Option<RedirectResolution>, DatabaseError> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload FROM resolver_cache WHERE url_fingerprint = ? AND expires_at_ms > ?",
        )
        .bind(key)
        .bind(self.clock.now_ms())
        .fetch_optional(self.pool.as_ref())
        .await?;

        payload
            .map(|p| {
                serde_json::from_str(&p)
                    .map_err(|e| DatabaseError::Corrupt(format!("resolver_cache[{key}]: {e}")))
            })
            .transpose()
    }

    async fn put(
        &self,
        key: &str,
        url: &str,
        value: &RedirectResolution,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        let payload =
            serde_json::to_string(value).map_err(|e| DatabaseError::Corrupt(e.to_string()))?;
        let expires_at = self.clock.now_ms() + ttl.as_millis() as i64;
        sqlx::query(
            "INSERT INTO resolver_cache (url_fingerprint, url, payload, expires_at_ms)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(url_fingerprint) DO UPDATE SET
                url = excluded.url,
                payload = excluded.payload,
                expires_at_ms = excluded.expires_at_ms",
        )
        .bind(key)
        .bind(url)
        .bind(payload)
        .bind(expires_at)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM resolver_cache WHERE expires_at_ms <= ?")
            .bind(self.clock.now_ms())
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
