use std::sync::Arc;

use chrono::DateTime;

use crate::cache::{CacheTier, RecordCache, Scheduler};
use crate::config::CacheSettings;
use crate::db::StoreGateway;
use crate::error::{AppError, Result};
use crate::models::{FeedEntry, FeedPage, UserInfo};

use super::{best_effort, UserService, VideoService};

const FEED_NAMESPACE: &str = "feed";

/// Time-ordered feed pages served from bucketed id-list windows
///
/// The id list for a cutoff is cached under the cutoff's time bucket, so
/// requests with different cutoffs inside one bucket share the answer that
/// was computed for the first of them.
pub struct FeedPaginator {
    store: Arc<dyn StoreGateway>,
    windows: RecordCache<i64, Vec<i64>>,
    videos: Arc<VideoService>,
    users: Arc<UserService>,
    bucket_millis: i64,
    page_size: i64,
}

impl FeedPaginator {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        tier: Arc<dyn CacheTier>,
        videos: Arc<VideoService>,
        users: Arc<UserService>,
        settings: &CacheSettings,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            store,
            windows: RecordCache::new(
                FEED_NAMESPACE,
                tier,
                settings.feed_ttl,
                settings.coalesce_window,
                scheduler,
            ),
            videos,
            users,
            bucket_millis: settings.feed_bucket_millis.max(1),
            page_size: settings.feed_page_size,
        }
    }

    /// Bucket key of a cutoff timestamp
    pub fn bucket(&self, before_ms: i64) -> i64 {
        before_ms.div_euclid(self.bucket_millis)
    }

    /// Page of videos created at or before `before_ms`, newest first
    ///
    /// `viewer` 0 is anonymous and gets no favorite or follow flags. Store
    /// failures never fail the page: a failed id list yields an empty page
    /// and a video that cannot be resolved is left out.
    pub async fn feed(&self, viewer: i64, before_ms: i64) -> FeedPage {
        let ids = match self.window(before_ms).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(before_ms, error = %e, "Failed to load feed window");
                return FeedPage::default();
            }
        };

        let mut videos = Vec::with_capacity(ids.len());
        let mut oldest_ms = None;

        for id in ids {
            let video = match self.videos.get_video(id).await {
                Ok(video) => video,
                Err(e) => {
                    tracing::warn!(video_id = id, error = %e, "Skipping unresolvable feed entry");
                    continue;
                }
            };

            let author = match self.users.user_info(video.author_id, viewer).await {
                Ok(author) => author,
                Err(e) => {
                    tracing::warn!(author_id = video.author_id, error = %e, "Author unavailable");
                    UserInfo::unknown(video.author_id)
                }
            };

            let is_favorite = viewer != 0
                && best_effort(self.videos.is_favorite(viewer, id).await, "favorite flag");

            oldest_ms = Some(video.created_at.timestamp_millis());
            let mut entry = FeedEntry::new(video, author);
            entry.is_favorite = is_favorite;
            videos.push(entry);
        }

        FeedPage {
            videos,
            next_time: oldest_ms.map_or(0, |ms| ms - 1),
        }
    }

    async fn window(&self, before_ms: i64) -> Result<Vec<i64>> {
        let bucket = self.bucket(before_ms);
        let store = Arc::clone(&self.store);
        let limit = self.page_size;

        self.windows
            .get_or_load(bucket, move || async move {
                let cutoff = DateTime::from_timestamp_millis(before_ms)
                    .ok_or_else(|| AppError::InvalidInput("latest_time out of range".to_string()))?;
                store.video_ids_before(cutoff, limit).await
            })
            .await
    }
}
