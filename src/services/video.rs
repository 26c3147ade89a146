use std::sync::Arc;

use crate::cache::{CacheTier, Invalidator, RecordCache, Scheduler};
use crate::config::CacheSettings;
use crate::db::StoreGateway;
use crate::error::{AppError, Result};
use crate::models::{NewVideo, UserField, Video, VideoChanges};

use super::user::field_cache_key;

const VIDEO_NAMESPACE: &str = "video";

/// Video reads through the record cache, writes bracketed by double delete
pub struct VideoService {
    store: Arc<dyn StoreGateway>,
    videos: RecordCache<i64, Video>,
    invalidator: Invalidator,
}

impl VideoService {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        tier: Arc<dyn CacheTier>,
        settings: &CacheSettings,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            store,
            videos: RecordCache::new(
                VIDEO_NAMESPACE,
                Arc::clone(&tier),
                settings.record_ttl,
                settings.coalesce_window,
                scheduler.clone(),
            ),
            invalidator: Invalidator::new(tier, scheduler, settings.invalidation_delay),
        }
    }

    pub async fn get_video(&self, id: i64) -> Result<Video> {
        let store = Arc::clone(&self.store);
        self.videos
            .get_or_load(id, move || async move {
                store.find_video(id).await?.ok_or(AppError::VideoNotFound)
            })
            .await
    }

    /// Store a new video and write it through to the cache
    pub async fn publish(&self, video: NewVideo) -> Result<Video> {
        if video.title.trim().is_empty() {
            return Err(AppError::InvalidInput("Title must not be empty".to_string()));
        }

        let video = self.store.insert_video(video).await?;
        self.videos.put(&video.id, &video).await;

        // The id had no cache entry before the insert, so only the
        // deferred delete applies
        self.invalidator.after(vec![self.videos.key(&video.id)]);

        tracing::info!(video_id = video.id, author_id = video.author_id, "Video published");
        Ok(video)
    }

    pub async fn update_video(&self, video: Video) -> Result<()> {
        let keys = vec![self.videos.key(&video.id)];
        self.invalidator
            .around(keys, self.store.update_video(&video))
            .await
    }

    /// Apply `changes` to the stored row of `id` and return the result
    ///
    /// The current row is read from the store, not the cache, so a stale
    /// cached copy cannot be written back.
    pub async fn edit(&self, id: i64, changes: VideoChanges) -> Result<Video> {
        let mut video = self
            .store
            .find_video(id)
            .await?
            .ok_or(AppError::VideoNotFound)?;

        changes.apply(&mut video);
        if video.title.trim().is_empty() {
            return Err(AppError::InvalidInput("Title must not be empty".to_string()));
        }

        self.update_video(video.clone()).await?;
        Ok(video)
    }

    /// Favorite (`on`) or unfavorite a video for `user_id`
    ///
    /// Invalidates the video record and the two user counters the
    /// favorite feeds into.
    pub async fn set_favorite(&self, user_id: i64, video_id: i64, on: bool) -> Result<()> {
        let author_id = self.get_video(video_id).await?.author_id;

        let keys = vec![
            self.videos.key(&video_id),
            field_cache_key(user_id, UserField::FavoriteCount),
            field_cache_key(author_id, UserField::TotalFavorited),
        ];

        let changed = self
            .invalidator
            .around(keys, self.store.set_favorite(user_id, video_id, on))
            .await?;

        tracing::debug!(user_id, video_id, on, changed, "Favorite updated");
        Ok(())
    }

    /// Whether `user_id` has favorited `video_id`; read straight from the store
    pub async fn is_favorite(&self, user_id: i64, video_id: i64) -> Result<bool> {
        self.store.is_favorite(user_id, video_id).await
    }
}
