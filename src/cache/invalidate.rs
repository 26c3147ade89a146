use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{CacheTier, Scheduler};

/// Write-path invalidation by delayed double delete
///
/// Keys are deleted before the store mutation and once more `delay` after
/// it. A reader that repopulated an entry with pre-write data in between
/// (from a lagging replica, or a load that started before the write) is
/// corrected by the second delete. Staleness is bounded by roughly `delay`,
/// not eliminated.
#[derive(Clone)]
pub struct Invalidator {
    tier: Arc<dyn CacheTier>,
    scheduler: Scheduler,
    delay: Duration,
}

impl Invalidator {
    pub fn new(tier: Arc<dyn CacheTier>, scheduler: Scheduler, delay: Duration) -> Self {
        Self {
            tier,
            scheduler,
            delay,
        }
    }

    /// Bracket `mutation` with the two deletes of every key
    ///
    /// The mutation's outcome is returned untouched; delete failures are only
    /// logged. The second delete is scheduled even when the mutation failed.
    pub async fn around<T, E, Fut>(&self, keys: Vec<String>, mutation: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        delete_all(self.tier.as_ref(), &keys).await;
        let outcome = mutation.await;
        self.after(keys);
        outcome
    }

    /// Schedule only the deferred delete, without waiting for it
    pub fn after(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        let tier = Arc::clone(&self.tier);
        self.scheduler.defer(self.delay, async move {
            delete_all(tier.as_ref(), &keys).await;
        });
    }
}

async fn delete_all(tier: &dyn CacheTier, keys: &[String]) {
    for key in keys {
        if let Err(e) = tier.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Cache invalidation failed");
        }
    }
}
