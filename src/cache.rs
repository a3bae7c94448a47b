//! Ephemeral cache
//! Mission: TTL key/value storage for entity snapshots and token revocations
//!
//! The cache is an optimisation. `CacheClient` swallows failures for
//! everything except the strict calls the revocation list relies on.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Key/value store with per-key expiry
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process cache. Expired keys are dropped on read and by `purge_expired`.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired key. Call periodically from a background task.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live_value(key).is_some())
    }
}

/// Shared handle to the cache, with a bound on every call
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn Cache>,
    timeout: Duration,
}

impl CacheClient {
    pub fn new(backend: Arc<dyn Cache>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("cache {} timed out after {:?}", op, self.timeout)),
        }
    }

    /// Cache read; a failure is a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.bounded("GET", self.backend.get(key)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, "Cache GET failed: {:#}", e);
                None
            }
        }
    }

    /// Cache write; a failure is a no-op.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        if let Err(e) = self.set_strict(key, value, ttl).await {
            warn!(key, "Cache SET failed: {:#}", e);
        }
    }

    /// Cache delete; a failure is a no-op.
    pub async fn del(&self, key: &str) {
        if let Err(e) = self.bounded("DEL", self.backend.del(key)).await {
            warn!(key, "Cache DEL failed: {:#}", e);
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, "Discarding undecodable cache entry: {}", e);
                self.del(key).await;
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl).await,
            Err(e) => warn!(key, "Failed to encode cache entry: {}", e),
        }
    }

    /// Existence check that reports failures instead of hiding them.
    pub async fn exists_strict(&self, key: &str) -> Result<bool> {
        self.bounded("EXISTS", self.backend.exists(key)).await
    }

    /// Write that reports failures instead of hiding them.
    pub async fn set_strict(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.bounded("SET", self.backend.set(key, value, ttl)).await
    }
}

/// Cache-aside snapshots for one entity type, keyed `<prefix>:<id>`
pub struct EntityCache<T> {
    cache: CacheClient,
    prefix: &'static str,
    ttl: Duration,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for EntityCache<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            prefix: self.prefix,
            ttl: self.ttl,
            _entity: PhantomData,
        }
    }
}

impl<T> EntityCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(cache: CacheClient, prefix: &'static str, ttl: Duration) -> Self {
        Self {
            cache,
            prefix,
            ttl,
            _entity: PhantomData,
        }
    }

    pub fn key(&self, id: &str) -> String {
        format!("{}:{}", self.prefix, id)
    }

    /// Serve from cache, else fetch from the store and repopulate.
    pub async fn load<F, Fut>(&self, id: &str, fetch: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = self.key(id);
        if let Some(hit) = self.cache.get_json::<T>(&key).await {
            debug!(key = %key, "cache hit");
            return Ok(Some(hit));
        }

        let fetched = fetch().await?;
        if let Some(entity) = &fetched {
            self.put(id, entity).await;
        }
        Ok(fetched)
    }

    pub async fn put(&self, id: &str, entity: &T) {
        self.cache
            .set_json(&self.key(id), entity, Some(self.ttl))
            .await;
    }

    pub async fn invalidate(&self, id: &str) {
        self.cache.del(&self.key(id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("connection refused"))
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
        async fn del(&self, _key: &str) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
        async fn exists(&self, _key: &str) -> Result<bool> {
            Err(anyhow!("connection refused"))
        }
    }

    struct StalledCache;

    #[async_trait]
    impl Cache for StalledCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
        async fn del(&self, _key: &str) -> Result<()> {
            Ok(())
        }
        async fn exists(&self, _key: &str) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(true)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        name: String,
    }

    fn client(backend: Arc<dyn Cache>) -> CacheClient {
        CacheClient::new(backend, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("short", "1", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        cache.set("forever", "1", None).await.unwrap();

        assert!(cache.exists("short").await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(!cache.exists("short").await.unwrap());
        assert_eq!(cache.get("forever").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache
            .set("a", "1", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        cache
            .set("b", "1", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_lenient_calls_swallow_failures() {
        let client = client(Arc::new(BrokenCache));

        assert_eq!(client.get("k").await, None);
        client.set("k", "v", None).await;
        client.del("k").await;
        assert!(client.exists_strict("k").await.is_err());
        assert!(client.set_strict("k", "v", None).await.is_err());
    }

    #[tokio::test]
    async fn test_calls_are_bounded() {
        let client = client(Arc::new(StalledCache));

        let started = Instant::now();
        assert_eq!(client.get("k").await, None);
        assert!(client.exists_strict("k").await.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_entity_cache_read_through() {
        let memory = MemoryCache::new();
        let widgets: EntityCache<Widget> = EntityCache::new(
            client(Arc::new(memory.clone())),
            "widget",
            Duration::from_secs(3600),
        );
        let fetches = AtomicUsize::new(0);
        let counter = &fetches;

        for _ in 0..3 {
            let loaded = widgets
                .load("7", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(Widget {
                        name: "gear".to_string(),
                    }))
                })
                .await
                .unwrap();
            assert_eq!(loaded.unwrap().name, "gear");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(memory.exists("widget:7").await.unwrap());

        widgets.invalidate("7").await;
        assert!(!memory.exists("widget:7").await.unwrap());
    }

    #[tokio::test]
    async fn test_entity_cache_miss_is_not_cached() {
        let memory = MemoryCache::new();
        let widgets: EntityCache<Widget> = EntityCache::new(
            client(Arc::new(memory.clone())),
            "widget",
            Duration::from_secs(3600),
        );

        let loaded = widgets.load("404", || async { Ok(None) }).await.unwrap();
        assert!(loaded.is_none());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_entry_falls_through() {
        let memory = MemoryCache::new();
        memory.set("widget:1", "{not json", None).await.unwrap();
        let widgets: EntityCache<Widget> = EntityCache::new(
            client(Arc::new(memory.clone())),
            "widget",
            Duration::from_secs(3600),
        );

        let loaded = widgets
            .load("1", || async {
                Ok(Some(Widget {
                    name: "fresh".to_string(),
                }))
            })
            .await
            .unwrap();
        assert_eq!(loaded.unwrap().name, "fresh");
    }
}
