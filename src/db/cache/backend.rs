use redis::AsyncCommands;
use redis::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::AppResult;

/// Minimal key/value contract the cache layer needs: string keys, string
/// values, per-entry expiry in seconds.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: u64) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed cache storage
#[derive(Clone)]
pub struct RedisBackend {
    client: Client,
}

impl RedisBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: u64) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // SETEX rejects a zero expiry
        let _: () = conn.set_ex(key, value, ttl.max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Writes between sweeps of expired memory entries
const PURGE_EVERY: u64 = 128;

/// Process-local cache storage for single-instance deployments and tests
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    writes: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > now => return Ok(Some(value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it so the map does not grow without bound
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: u64) -> AppResult<()> {
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(ttl.max(1));
        let mut entries = self.entries.write().await;

        // Superseded version keys and old sessions are never read again
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            let before = entries.len();
            entries.retain(|_, (_, expires_at)| *expires_at > now);
            tracing::debug!(purged = before - entries.len(), "Expired cache entries purged");
        }

        entries.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("k").await.unwrap(), None);

        backend.set("k", "v", 60).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(backend.len().await, 1);

        backend.delete("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_backend_overwrite_keeps_latest() {
        let backend = MemoryBackend::new();
        backend.set("k", "old", 60).await.unwrap();
        backend.set("k", "new", 60).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_memory_backend_expiry() {
        let backend = MemoryBackend::new();
        {
            let mut entries = backend.entries.write().await;
            entries.insert(
                "old".to_string(),
                ("v".to_string(), Instant::now() - Duration::from_secs(1)),
            );
        }
        assert_eq!(backend.get("old").await.unwrap(), None);
        assert!(backend.entries.read().await.get("old").is_none());
    }

    #[tokio::test]
    async fn test_memory_backend_sweeps_unread_expired_entries() {
        let backend = MemoryBackend::new();
        {
            let mut entries = backend.entries.write().await;
            let past = Instant::now() - Duration::from_secs(1);
            for i in 0..100 {
                entries.insert(format!("recs:old:{}", i), ("v".to_string(), past));
            }
        }

        for i in 0..PURGE_EVERY {
            backend.set(&format!("fresh:{}", i), "v", 60).await.unwrap();
        }

        assert_eq!(backend.len().await, PURGE_EVERY as usize);
        assert_eq!(backend.entries.read().await.len(), PURGE_EVERY as usize);
    }

    // Requires a running Redis; set REDIS_URL to point at it.
    #[tokio::test]
    #[ignore]
    async fn test_redis_backend_roundtrip() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let backend = RedisBackend::new(create_redis_client(&redis_url).unwrap());

        backend.set("cinematch:test:k", "v", 60).await.unwrap();
        assert_eq!(
            backend.get("cinematch:test:k").await.unwrap(),
            Some("v".to_string())
        );
        backend.delete("cinematch:test:k").await.unwrap();
        assert_eq!(backend.get("cinematch:test:k").await.unwrap(), None);
    }
}
