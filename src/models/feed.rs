use serde::Serialize;

use super::{UserInfo, Video};

/// One video of a feed page, enriched for the viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub id: i64,
    pub author: UserInfo,
    pub play_url: String,
    pub cover_url: String,
    pub favorite_count: i64,
    pub comment_count: i64,
    pub is_favorite: bool,
    pub title: String,
}

impl FeedEntry {
    pub fn new(video: Video, author: UserInfo) -> Self {
        Self {
            id: video.id,
            author,
            play_url: video.play_url,
            cover_url: video.cover_url,
            favorite_count: video.favorite_count,
            comment_count: video.comment_count,
            is_favorite: false,
            title: video.title,
        }
    }
}

/// A page of the feed plus the cursor for the next one
///
/// `next_time` is 0 when the feed is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedPage {
    pub videos: Vec<FeedEntry>,
    pub next_time: i64,
}
