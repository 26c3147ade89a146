//! Read and write paths exposed to request handlers.

pub mod feed;
pub mod limit;
pub mod user;
pub mod video;

pub use feed::FeedPaginator;
pub use limit::AttemptLimiter;
pub use user::UserService;
pub use video::VideoService;

use std::sync::Arc;

use crate::cache::{CacheTier, Scheduler};
use crate::config::CacheSettings;
use crate::db::StoreGateway;
use crate::error::Result;
use crate::filter::ExistenceFilter;
use crate::relations::RelationStore;

/// Fully wired service graph, shared by every handler
#[derive(Clone)]
pub struct App {
    pub users: Arc<UserService>,
    pub videos: Arc<VideoService>,
    pub feed: Arc<FeedPaginator>,
    pub limiter: Arc<AttemptLimiter>,
    pub scheduler: Scheduler,
}

impl App {
    /// Wire the components: store, then existence filter, then caches,
    /// then the paginator
    ///
    /// Fails when the existence filter cannot be built from the store.
    pub async fn build(
        store: Arc<dyn StoreGateway>,
        tier: Arc<dyn CacheTier>,
        relations: Arc<dyn RelationStore>,
        settings: &CacheSettings,
        pepper: String,
    ) -> Result<Self> {
        let scheduler = Scheduler::new();

        let filter = Arc::new(
            ExistenceFilter::bootstrap(
                store.as_ref(),
                settings.filter_capacity,
                settings.filter_false_positive_rate,
            )
            .await?,
        );

        let users = Arc::new(UserService::new(
            Arc::clone(&store),
            filter,
            Arc::clone(&tier),
            relations,
            settings,
            scheduler.clone(),
            pepper,
        ));
        let videos = Arc::new(VideoService::new(
            Arc::clone(&store),
            Arc::clone(&tier),
            settings,
            scheduler.clone(),
        ));
        let limiter = Arc::new(AttemptLimiter::new(
            Arc::clone(&tier),
            settings.login_attempt_limit,
            settings.login_attempt_window,
        ));
        let feed = Arc::new(FeedPaginator::new(
            store,
            tier,
            Arc::clone(&videos),
            Arc::clone(&users),
            settings,
            scheduler.clone(),
        ));

        tracing::info!("Services initialized");
        Ok(Self {
            users,
            videos,
            feed,
            limiter,
            scheduler,
        })
    }
}

/// Value of an optional enrichment, or its default when the lookup failed
pub(crate) fn best_effort<T: Default>(result: Result<T>, what: &'static str) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Ignoring failed {} lookup", what);
        T::default()
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use crate::config::CacheSettings;

    /// Settings with short delays and small filters for unit tests
    pub fn settings() -> CacheSettings {
        CacheSettings {
            invalidation_delay: Duration::from_millis(50),
            coalesce_window: Duration::from_millis(20),
            filter_capacity: 10_000,
            ..CacheSettings::default()
        }
    }
}
