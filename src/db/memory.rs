use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::StoreGateway;
use crate::error::{AppError, Result};
use crate::models::{Credential, FieldValue, NewUser, NewVideo, UserField, Video};

#[derive(Debug, Clone)]
struct UserRow {
    credential: Credential,
    favorite_count: i64,
    total_favorited: i64,
}

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    next_video_id: i64,
    users: HashMap<i64, UserRow>,
    names: HashMap<String, i64>,
    videos: HashMap<i64, Video>,
    favorites: BTreeSet<(i64, i64)>,
}

/// In-process [`StoreGateway`] for tests and local development
///
/// Supports failure injection (`fail_next`) and artificial latency so that
/// cache and coalescing behaviour can be observed.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failures: AtomicUsize,
    latency_ms: AtomicU64,
    queries: AtomicUsize,
    video_reads: AtomicUsize,
    feed_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` store calls fail with a pool timeout
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Delay every store call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Total number of store calls served
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of `find_video` calls served
    pub fn video_reads(&self) -> usize {
        self.video_reads.load(Ordering::SeqCst)
    }

    /// Number of `video_ids_before` calls served
    pub fn feed_reads(&self) -> usize {
        self.feed_reads.load(Ordering::SeqCst)
    }

    /// Insert a video with an explicit creation time
    pub fn insert_video_at(&self, video: NewVideo, created_at: DateTime<Utc>) -> Video {
        let mut tables = self.tables.lock();
        tables.next_video_id += 1;
        let stored = Video {
            id: tables.next_video_id,
            author_id: video.author_id,
            favorite_count: 0,
            comment_count: 0,
            title: video.title,
            play_url: video.play_url,
            cover_url: video.cover_url,
            created_at: truncate_to_millis(created_at),
        };
        tables.videos.insert(stored.id, stored.clone());
        stored
    }

    /// Overwrite a video row without going through any cache
    pub fn put_video(&self, video: Video) {
        self.tables.lock().videos.insert(video.id, video);
    }

    async fn enter(&self) -> Result<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AppError::from(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

/// The store keeps creation times at millisecond precision so that a
/// `last - 1ms` feed cursor excludes exactly the rows already returned
fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.enter().await
    }

    async fn scan_user_identities(&self) -> Result<Vec<(i64, String)>> {
        self.enter().await?;
        let tables = self.tables.lock();
        Ok(tables
            .users
            .iter()
            .map(|(id, row)| (*id, row.credential.name.clone()))
            .collect())
    }

    async fn find_credential(&self, name: &str) -> Result<Option<Credential>> {
        self.enter().await?;
        let tables = self.tables.lock();
        Ok(tables
            .names
            .get(name)
            .and_then(|id| tables.users.get(id))
            .map(|row| row.credential.clone()))
    }

    async fn insert_user(&self, user: NewUser) -> Result<i64> {
        self.enter().await?;
        let mut tables = self.tables.lock();
        if tables.names.contains_key(&user.name) {
            return Err(AppError::UserAlreadyExists);
        }

        tables.next_user_id += 1;
        let id = tables.next_user_id;
        tables.names.insert(user.name.clone(), id);
        tables.users.insert(
            id,
            UserRow {
                credential: Credential {
                    id,
                    name: user.name,
                    digest: user.digest,
                    salt: user.salt,
                },
                favorite_count: 0,
                total_favorited: 0,
            },
        );
        Ok(id)
    }

    async fn user_field(&self, id: i64, field: UserField) -> Result<Option<FieldValue>> {
        self.enter().await?;
        let tables = self.tables.lock();
        Ok(tables.users.get(&id).map(|row| match field {
            UserField::Name => FieldValue::Text(row.credential.name.clone()),
            UserField::TotalFavorited => FieldValue::Count(row.total_favorited),
            UserField::FavoriteCount => FieldValue::Count(row.favorite_count),
        }))
    }

    async fn find_video(&self, id: i64) -> Result<Option<Video>> {
        self.video_reads.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(self.tables.lock().videos.get(&id).cloned())
    }

    async fn insert_video(&self, video: NewVideo) -> Result<Video> {
        self.enter().await?;
        Ok(self.insert_video_at(video, Utc::now()))
    }

    async fn update_video(&self, video: &Video) -> Result<()> {
        self.enter().await?;
        let mut tables = self.tables.lock();
        let stored = tables
            .videos
            .get_mut(&video.id)
            .ok_or(AppError::VideoNotFound)?;

        stored.favorite_count = video.favorite_count;
        stored.comment_count = video.comment_count;
        stored.title = video.title.clone();
        stored.play_url = video.play_url.clone();
        stored.cover_url = video.cover_url.clone();
        Ok(())
    }

    async fn video_ids_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<i64>> {
        self.feed_reads.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let tables = self.tables.lock();

        let mut matching: Vec<&Video> = tables
            .videos
            .values()
            .filter(|v| v.created_at <= cutoff)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(matching
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|v| v.id)
            .collect())
    }

    async fn is_favorite(&self, user_id: i64, video_id: i64) -> Result<bool> {
        self.enter().await?;
        Ok(self.tables.lock().favorites.contains(&(user_id, video_id)))
    }

    async fn set_favorite(&self, user_id: i64, video_id: i64, on: bool) -> Result<bool> {
        self.enter().await?;
        let mut tables = self.tables.lock();

        let author_id = tables
            .videos
            .get(&video_id)
            .map(|v| v.author_id)
            .ok_or(AppError::VideoNotFound)?;

        let toggled = if on {
            tables.favorites.insert((user_id, video_id))
        } else {
            tables.favorites.remove(&(user_id, video_id))
        };
        if !toggled {
            return Ok(false);
        }

        let delta = if on { 1 } else { -1 };
        if let Some(video) = tables.videos.get_mut(&video_id) {
            video.favorite_count += delta;
        }
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.favorite_count += delta;
        }
        if let Some(author) = tables.users.get_mut(&author_id) {
            author.total_favorited += delta;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn new_video(author_id: i64, title: &str) -> NewVideo {
        NewVideo {
            author_id,
            title: title.to_string(),
            play_url: format!("https://cdn/{}.mp4", title),
            cover_url: format!("https://cdn/{}.jpg", title),
        }
    }

    #[tokio::test]
    async fn test_video_ids_before_orders_newest_first() {
        let store = MemoryStore::new();
        let base = Utc::now();
        let old = store.insert_video_at(new_video(1, "old"), base - ChronoDuration::seconds(30));
        let mid = store.insert_video_at(new_video(1, "mid"), base - ChronoDuration::seconds(20));
        let new = store.insert_video_at(new_video(1, "new"), base - ChronoDuration::seconds(10));

        let ids = store.video_ids_before(base, 10).await.unwrap();
        assert_eq!(ids, vec![new.id, mid.id, old.id]);

        let ids = store.video_ids_before(mid.created_at, 10).await.unwrap();
        assert_eq!(ids, vec![mid.id, old.id]);

        let ids = store.video_ids_before(base, 1).await.unwrap();
        assert_eq!(ids, vec![new.id]);
    }

    #[tokio::test]
    async fn test_fail_next_injects_failures() {
        let store = MemoryStore::new();
        store.fail_next(1);

        assert!(matches!(
            store.find_video(1).await,
            Err(AppError::Database(_))
        ));
        assert!(store.find_video(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_favorite_adjusts_counters_once() {
        let store = MemoryStore::new();
        let author = store
            .insert_user(NewUser {
                name: "author".into(),
                digest: "d".into(),
                salt: "s".into(),
            })
            .await
            .unwrap();
        let fan = store
            .insert_user(NewUser {
                name: "fan".into(),
                digest: "d".into(),
                salt: "s".into(),
            })
            .await
            .unwrap();
        let video = store.insert_video(new_video(author, "clip")).await.unwrap();

        assert!(store.set_favorite(fan, video.id, true).await.unwrap());
        assert!(!store.set_favorite(fan, video.id, true).await.unwrap());

        assert!(store.is_favorite(fan, video.id).await.unwrap());
        assert_eq!(store.find_video(video.id).await.unwrap().unwrap().favorite_count, 1);
        assert_eq!(
            store.user_field(fan, UserField::FavoriteCount).await.unwrap(),
            Some(FieldValue::Count(1))
        );
        assert_eq!(
            store.user_field(author, UserField::TotalFavorited).await.unwrap(),
            Some(FieldValue::Count(1))
        );

        assert!(store.set_favorite(fan, video.id, false).await.unwrap());
        assert!(!store.is_favorite(fan, video.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = MemoryStore::new();
        let user = NewUser {
            name: "alice".into(),
            digest: "d".into(),
            salt: "s".into(),
        };

        store.insert_user(user.clone()).await.unwrap();
        assert!(matches!(
            store.insert_user(user).await,
            Err(AppError::UserAlreadyExists)
        ));
    }
}
