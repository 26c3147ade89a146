use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Video record as stored and as cached (whole record, JSON encoded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Video {
    pub id: i64,
    pub author_id: i64,
    pub favorite_count: i64,
    pub comment_count: i64,
    pub title: String,
    pub play_url: String,
    pub cover_url: String,
    /// Feed sort key
    pub created_at: DateTime<Utc>,
}

/// Video to insert on upload
#[derive(Debug, Clone, Deserialize)]
pub struct NewVideo {
    pub author_id: i64,
    pub title: String,
    pub play_url: String,
    pub cover_url: String,
}

/// Partial update of the editable columns of a video
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoChanges {
    pub title: Option<String>,
    pub play_url: Option<String>,
    pub cover_url: Option<String>,
}

impl VideoChanges {
    pub fn apply(self, video: &mut Video) {
        if let Some(title) = self.title {
            video.title = title;
        }
        if let Some(play_url) = self.play_url {
            video.play_url = play_url;
        }
        if let Some(cover_url) = self.cover_url {
            video.cover_url = cover_url;
        }
    }
}
