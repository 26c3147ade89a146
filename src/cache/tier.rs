use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::CacheError;

/// A byte-oriented key/value cache with per-entry TTL
///
/// Deleting an absent key succeeds.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process, capacity-bounded cache tier
pub struct MemoryTier {
    entries: Mutex<FxHashMap<String, Entry>>,
    capacity: usize,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            capacity: capacity.max(1),
        }
    }

    /// Number of entries currently held, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn make_room(entries: &mut FxHashMap<String, Entry>, capacity: usize, now: Instant) {
        if entries.len() < capacity {
            return;
        }
        entries.retain(|_, entry| entry.expires_at > now);

        if entries.len() >= capacity {
            let soonest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = soonest {
                entries.remove(&key);
            }
        }
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if !entries.contains_key(key) {
            Self::make_room(&mut entries, self.capacity, now);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// An in-process tier in front of a shared remote tier, presented as one
pub struct TieredCache {
    local: Arc<dyn CacheTier>,
    remote: Arc<dyn CacheTier>,
    local_ttl: Duration,
}

impl TieredCache {
    /// `local_ttl` caps how long a remote hit is kept locally
    pub fn new(local: Arc<dyn CacheTier>, remote: Arc<dyn CacheTier>, local_ttl: Duration) -> Self {
        Self {
            local,
            remote,
            local_ttl,
        }
    }
}

#[async_trait]
impl CacheTier for TieredCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(value) = self.local.get(key).await? {
            return Ok(Some(value));
        }

        let value = self.remote.get(key).await?;
        if let Some(ref bytes) = value {
            if let Err(e) = self.local.set(key, bytes.clone(), self.local_ttl).await {
                tracing::warn!(key = %key, error = %e, "Failed to promote entry to local tier");
            }
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let local_ttl = ttl.min(self.local_ttl);
        self.local.set(key, value.clone(), local_ttl).await?;
        self.remote.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        // Both tiers are attempted even if the first fails
        let local = self.local.delete(key).await;
        let remote = self.remote.delete(key).await;
        local.and(remote)
    }
}
