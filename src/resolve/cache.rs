//! Durable resolution cache interface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::RedirectResolution;
use crate::clock::Clock;
use crate::error_handling::DatabaseError;

/// Time-boxed store of resolutions keyed by URL fingerprint.
///
/// Entries are written once and simply expire.
#[async_trait]
pub trait ResolutionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RedirectResolution>, DatabaseError>;

    async fn put(
        &self,
        key: &str,
        url: &str,
        value: &RedirectResolution,
        ttl: Duration,
    ) -> Result<(), DatabaseError>;

    /// Drops expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, DatabaseError>;
}

/// In-process cache driven by an injected clock.
pub struct MemoryResolutionCache {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (RedirectResolution, i64)>>,
}

impl MemoryResolutionCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl ResolutionCache for MemoryResolutionCache {
    async fn get(&self, key: &str) -> Result<Option<RedirectResolution>, DatabaseError> {
        let now = self.clock.now_ms();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    async fn put(
        &self,
        key: &str,
        _url: &str,
        value: &RedirectResolution,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        let expires_at = self.clock.now_ms() + ttl.as_millis() as i64;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.clone(), expires_at));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::resolve::Origin;

    fn sample() -> RedirectResolution {
        RedirectResolution {
            final_url: "/new/".into(),
            status_code: 200,
            status_message: "OK".into(),
            first_hop_code: Some(301),
            is_permanent: true,
            origin: Origin::Http,
        }
    }

    #[tokio::test]
    async fn test_memory_cache_expires() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = MemoryResolutionCache::new(clock.clone());
        cache
            .put("k", "/old/", &sample(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(sample()));

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.len().await, 0);
    }
}
