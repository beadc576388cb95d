//! Time-boxed advisory leases.
//!
//! A lease is a named row holding a token and an expiry. A lease whose expiry
//! has passed is treated as absent, so a crashed session frees itself once
//! the TTL runs out.

use std::sync::Arc;
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::Rng;
use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::config::SESSION_TOKEN_LENGTH;
use crate::error_handling::DatabaseError;

/// Fresh alphanumeric session token.
pub fn new_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

pub struct LeaseStore {
    pool: Arc<SqlitePool>,
    clock: Arc<dyn Clock>,
}

impl LeaseStore {
    pub fn new(pool: Arc<SqlitePool>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Token of the live lease named `name`, if any.
    pub async fn live(&self, name: &str) -> Result<Option<String>, DatabaseError> {
        let token: Option<String> = sqlx::query_scalar(
            "SELECT token FROM leases WHERE name = ? AND expires_at_ms > ?",
        )
        .bind(name)
        .bind(self.clock.now_ms())
        .fetch_optional(self.pool.as_ref())
        .await?;
        Ok(token)
    }

    /// Takes the lease only if nobody holds a live one. Returns whether it was taken.
    pub async fn try_acquire(
        &self,
        name: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, DatabaseError> {
        let now = self.clock.now_ms();
        let result = sqlx::query(
            "INSERT INTO leases (name, token, expires_at_ms) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                token = excluded.token,
                expires_at_ms = excluded.expires_at_ms
             WHERE leases.expires_at_ms <= ?",
        )
        .bind(name)
        .bind(token)
        .bind(now + ttl.as_millis() as i64)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sets (or extends) the lease unconditionally.
    pub async fn refresh(&self, name: &str, token: &str, ttl: Duration) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO leases (name, token, expires_at_ms) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                token = excluded.token,
                expires_at_ms = excluded.expires_at_ms",
        )
        .bind(name)
        .bind(token)
        .bind(self.clock.now_ms() + ttl.as_millis() as i64)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    pub async fn release(&self, name: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM leases WHERE name = ?")
            .bind(name)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::test_helpers::create_test_pool;

    async fn store() -> (LeaseStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let pool = Arc::new(create_test_pool().await);
        (LeaseStore::new(pool, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_acquire_blocks_second_holder_until_expiry() {
        let (leases, clock) = store().await;
        let ttl = Duration::from_secs(60);

        assert!(leases.try_acquire("scan", "aaa", ttl).await.unwrap());
        assert!(!leases.try_acquire("scan", "bbb", ttl).await.unwrap());
        assert_eq!(leases.live("scan").await.unwrap().as_deref(), Some("aaa"));

        clock.advance(Duration::from_secs(61));
        assert_eq!(leases.live("scan").await.unwrap(), None);
        assert!(leases.try_acquire("scan", "bbb", ttl).await.unwrap());
        assert_eq!(leases.live("scan").await.unwrap().as_deref(), Some("bbb"));
    }

    #[tokio::test]
    async fn test_refresh_extends_and_release_clears() {
        let (leases, clock) = store().await;
        let ttl = Duration::from_secs(60);
        leases.refresh("bulk", "tok", ttl).await.unwrap();

        clock.advance(Duration::from_secs(45));
        leases.refresh("bulk", "tok", ttl).await.unwrap();
        clock.advance(Duration::from_secs(45));
        assert_eq!(leases.live("bulk").await.unwrap().as_deref(), Some("tok"));

        leases.release("bulk").await.unwrap();
        assert_eq!(leases.live("bulk").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_leases_are_independent_by_name() {
        let (leases, _clock) = store().await;
        let ttl = Duration::from_secs(60);
        assert!(leases.try_acquire("scan", "a", ttl).await.unwrap());
        assert!(leases.try_acquire("bulk", "b", ttl).await.unwrap());
    }

    #[test]
    fn test_new_token_is_alphanumeric() {
        let a = new_token();
        assert_eq!(a.len(), SESSION_TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, new_token());
    }
}
