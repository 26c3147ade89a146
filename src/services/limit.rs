use std::sync::Arc;
use std::time::Duration;

use crate::cache::record::cache_key;
use crate::cache::CacheTier;
use crate::error::{AppError, Result};

const LIMIT_NAMESPACE: &str = "limit";

/// Per-client attempt counter for register and login, kept in the cache tier
///
/// Each accepted attempt rewrites the counter with a fresh `window` TTL, so
/// a client is let back in once it has been quiet for a whole window.
/// Counting is best-effort: a tier failure lets the attempt through, and
/// concurrent attempts from one client may both read the same count.
pub struct AttemptLimiter {
    tier: Arc<dyn CacheTier>,
    max_attempts: u64,
    window: Duration,
}

impl AttemptLimiter {
    pub fn new(tier: Arc<dyn CacheTier>, max_attempts: u64, window: Duration) -> Self {
        Self {
            tier,
            max_attempts,
            window,
        }
    }

    /// Count one attempt by `client`, failing with `RateLimitExceeded` once
    /// `max_attempts` have been seen within the window
    pub async fn check(&self, client: &str) -> Result<()> {
        let key = cache_key(LIMIT_NAMESPACE, &client);

        let attempts = match self.tier.get(&key).await {
            Ok(Some(raw)) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|count| count.parse::<u64>().ok())
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(client, error = %e, "Attempt counter unavailable");
                return Ok(());
            }
        };

        if attempts >= self.max_attempts {
            tracing::warn!(client, attempts, "Attempt limit exceeded");
            return Err(AppError::RateLimitExceeded);
        }

        let next = (attempts + 1).to_string().into_bytes();
        if let Err(e) = self.tier.set(&key, next, self.window).await {
            tracing::warn!(client, error = %e, "Failed to record attempt");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTier;
    use crate::error::CacheError;
    use async_trait::async_trait;

    fn limiter(max_attempts: u64, window_ms: u64) -> AttemptLimiter {
        AttemptLimiter::new(
            Arc::new(MemoryTier::new(64)),
            max_attempts,
            Duration::from_millis(window_ms),
        )
    }

    struct UnreachableTier;

    #[async_trait]
    impl CacheTier for UnreachableTier {
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
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_attempts_up_to_limit_are_allowed() {
        let limiter = limiter(10, 60_000);

        for attempt in 1..=10 {
            assert!(
                limiter.check("10.0.0.1").await.is_ok(),
                "Attempt {attempt} should pass"
            );
        }
    }

    #[tokio::test]
    async fn test_attempt_over_limit_is_rejected() {
        let limiter = limiter(10, 60_000);
        for _ in 0..10 {
            limiter.check("10.0.0.1").await.unwrap();
        }

        assert!(matches!(
            limiter.check("10.0.0.1").await,
            Err(AppError::RateLimitExceeded)
        ));
        // Rejections keep failing while the window lasts
        assert!(matches!(
            limiter.check("10.0.0.1").await,
            Err(AppError::RateLimitExceeded)
        ));
    }

    #[tokio::test]
    async fn test_clients_are_counted_separately() {
        let limiter = limiter(2, 60_000);
        limiter.check("10.0.0.1").await.unwrap();
        limiter.check("10.0.0.1").await.unwrap();

        assert!(limiter.check("10.0.0.1").await.is_err());
        assert!(limiter.check("10.0.0.2").await.is_ok());
    }

    #[tokio::test]
    async fn test_counter_resets_after_quiet_window() {
        let limiter = limiter(1, 40);
        limiter.check("10.0.0.1").await.unwrap();
        assert!(limiter.check("10.0.0.1").await.is_err());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(limiter.check("10.0.0.1").await.is_ok());
    }

    #[tokio::test]
    async fn test_tier_failure_lets_attempts_through() {
        let limiter = AttemptLimiter::new(Arc::new(UnreachableTier), 1, Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").await.is_ok());
        }
    }
}
