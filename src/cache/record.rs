use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use super::{CacheTier, Coalescer, Scheduler};
use crate::error::Result;

/// Cache-aside access to one kind of record
///
/// Keys render as `<namespace>:<key>`, so population and invalidation of a
/// record always address the same cache entry. Every cache-tier failure is
/// logged and reported as a miss; none reaches the caller.
pub struct RecordCache<K, V> {
    namespace: &'static str,
    tier: Arc<dyn CacheTier>,
    ttl: Duration,
    coalescer: Coalescer<K, V>,
    _record: PhantomData<fn() -> V>,
}

impl<K, V> RecordCache<K, V>
where
    K: Display + Eq + Hash + Clone + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        namespace: &'static str,
        tier: Arc<dyn CacheTier>,
        ttl: Duration,
        coalesce_window: Duration,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            namespace,
            tier,
            ttl,
            coalescer: Coalescer::new(coalesce_window, scheduler),
            _record: PhantomData,
        }
    }

    /// Cache key for `key`
    pub fn key(&self, key: &K) -> String {
        cache_key(self.namespace, key)
    }

    /// Cached value, or `None` on miss, tier failure or undecodable payload
    pub async fn get(&self, key: &K) -> Option<V> {
        lookup(self.tier.as_ref(), &self.key(key)).await
    }

    /// Write-through with the default TTL
    pub async fn put(&self, key: &K, value: &V) {
        self.put_with_ttl(key, value, self.ttl).await
    }

    pub async fn put_with_ttl(&self, key: &K, value: &V, ttl: Duration) {
        store(self.tier.as_ref(), &self.key(key), value, ttl).await
    }

    pub async fn delete(&self, key: &K) {
        let cache_key = self.key(key);
        if let Err(e) = self.tier.delete(&cache_key).await {
            tracing::warn!(key = %cache_key, error = %e, "Cache delete failed");
        }
    }

    /// Cache-aside read: serve from cache, otherwise load once and populate
    pub async fn get_or_load<F, Fut>(&self, key: K, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!(namespace = self.namespace, key = %key, "Cache hit");
            return Ok(value);
        }
        tracing::debug!(namespace = self.namespace, key = %key, "Cache miss");
        self.load(key, loader).await
    }

    /// Coalesced load that populates the cache on success, skipping the lookup
    pub async fn load<F, Fut>(&self, key: K, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let tier = Arc::clone(&self.tier);
        let cache_key = self.key(&key);
        let ttl = self.ttl;

        self.coalescer
            .load_once(key, move || {
                let fut = loader();
                async move {
                    let value = fut.await?;
                    store(tier.as_ref(), &cache_key, &value, ttl).await;
                    Ok(value)
                }
            })
            .await
    }
}

pub(crate) fn cache_key<K: Display>(namespace: &str, key: &K) -> String {
    format!("{}:{}", namespace, key)
}

async fn lookup<V: DeserializeOwned>(tier: &dyn CacheTier, key: &str) -> Option<V> {
    let bytes = match tier.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Cache read failed, falling back to store");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Cached payload undecodable, treating as miss");
            None
        }
    }
}

async fn store<V: Serialize>(tier: &dyn CacheTier, key: &str, value: &V, ttl: Duration) {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to encode record for cache");
            return;
        }
    };

    if let Err(e) = tier.set(key, bytes, ttl).await {
        tracing::warn!(key = %key, error = %e, "Cache write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTier;
    use crate::error::{AppError, CacheError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record_cache(tier: Arc<dyn CacheTier>) -> RecordCache<i64, String> {
        RecordCache::new(
            "title",
            tier,
            Duration::from_secs(60),
            Duration::from_millis(200),
            Scheduler::new(),
        )
    }

    /// Tier whose every operation fails
    struct BrokenTier;

    #[async_trait]
    impl CacheTier for BrokenTier {
        async fn get(&self, _key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Codec(serde_json::from_str::<u8>("x").unwrap_err()))
        }

        async fn set(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> std::result::Result<(), CacheError> {
            Err(CacheError::Codec(serde_json::from_str::<u8>("x").unwrap_err()))
        }

        async fn delete(&self, _key: &str) -> std::result::Result<(), CacheError> {
            Err(CacheError::Codec(serde_json::from_str::<u8>("x").unwrap_err()))
        }
    }

    #[tokio::test]
    async fn test_put_then_get_returns_value() {
        let cache = record_cache(Arc::new(MemoryTier::new(16)));

        cache.put(&1, &"hello".to_string()).await;

        assert_eq!(cache.get(&1).await, Some("hello".to_string()));
        assert_eq!(cache.get(&2).await, None);
    }

    #[tokio::test]
    async fn test_keys_are_namespaced() {
        let cache = record_cache(Arc::new(MemoryTier::new(16)));
        assert_eq!(cache.key(&42), "title:42");
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let tier = Arc::new(MemoryTier::new(16));
        tier.set("title:1", b"not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = record_cache(tier);

        assert_eq!(cache.get(&1).await, None);

        let value = cache
            .get_or_load(1, || async { Ok("reloaded".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "reloaded");
        assert_eq!(cache.get(&1).await, Some("reloaded".to_string()));
    }

    #[tokio::test]
    async fn test_get_or_load_populates_then_hits() {
        let cache = record_cache(Arc::new(MemoryTier::new(16)));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .get_or_load(9, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("loaded".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "loaded");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache = record_cache(Arc::new(MemoryTier::new(16)));

        let result = cache
            .get_or_load(5, || async { Err::<String, _>(AppError::VideoNotFound) })
            .await;

        assert!(matches!(result, Err(AppError::VideoNotFound)));
        assert_eq!(cache.get(&5).await, None);
    }

    #[tokio::test]
    async fn test_broken_tier_degrades_to_loader() {
        let cache = record_cache(Arc::new(BrokenTier));

        cache.put(&1, &"ignored".to_string()).await;
        cache.delete(&1).await;
        assert_eq!(cache.get(&1).await, None);

        let value = cache
            .get_or_load(1, || async { Ok("from store".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "from store");
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_noop() {
        let cache = record_cache(Arc::new(MemoryTier::new(16)));

        cache.delete(&404).await;
        cache.delete(&404).await;

        assert_eq!(cache.get(&404).await, None);
    }
}
