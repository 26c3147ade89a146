use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::models::FeedPage;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Cursor in unix milliseconds; missing or non-positive means now
    pub latest_time: Option<i64>,
    #[serde(default)]
    pub viewer_id: i64,
}

/// Feed page endpoint
///
/// Never fails: store trouble shows up as a short or empty page.
pub async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Json<FeedPage> {
    let before_ms = query
        .latest_time
        .filter(|ts| *ts > 0)
        .unwrap_or_else(|| Utc::now().timestamp_millis());

    Json(state.app.feed.feed(query.viewer_id, before_ms).await)
}
