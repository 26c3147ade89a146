use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{NewVideo, Video, VideoChanges};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub user_id: i64,
    pub video_id: i64,
    /// `true` to favorite, `false` to undo
    pub favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub success: bool,
}

pub async fn get_video(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Video>> {
    let video = state.app.videos.get_video(id).await?;
    Ok(Json(video))
}

/// Publish a new video
///
/// Returns 201 Created with the stored record.
pub async fn publish_video(
    State(state): State<AppState>,
    Json(payload): Json<NewVideo>,
) -> Result<(StatusCode, Json<Video>)> {
    let video = state.app.videos.publish(payload).await?;
    Ok((StatusCode::CREATED, Json(video)))
}

/// Edit title or media URLs of a video
pub async fn update_video(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(changes): Json<VideoChanges>,
) -> Result<Json<Video>> {
    let video = state.app.videos.edit(id, changes).await?;
    Ok(Json(video))
}

pub async fn set_favorite(
    State(state): State<AppState>,
    Json(payload): Json<FavoriteRequest>,
) -> Result<Json<FavoriteResponse>> {
    state
        .app
        .videos
        .set_favorite(payload.user_id, payload.video_id, payload.favorite)
        .await?;

    Ok(Json(FavoriteResponse { success: true }))
}
