use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::UserInfo;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserIdResponse {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    #[serde(default)]
    pub viewer_id: i64,
}

/// Address the attempt limiter counts against
///
/// The first `X-Forwarded-For` hop wins over the socket peer, since the
/// service normally sits behind a gateway.
fn client_address(headers: &HeaderMap, peer: Option<ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|hop| hop.trim().to_string())
        .filter(|hop| !hop.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Register a new user
///
/// Returns 409 Conflict if the name is taken, 429 when the client has
/// made too many attempts.
pub async fn register_user(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<UserIdResponse>)> {
    state
        .app
        .limiter
        .check(&client_address(&headers, peer))
        .await?;

    let user_id = state
        .app
        .users
        .register(&payload.name, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(UserIdResponse { user_id })))
}

/// Check credentials and return the user id
pub async fn login_user(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<UserIdResponse>> {
    state
        .app
        .limiter
        .check(&client_address(&headers, peer))
        .await?;

    let user_id = state
        .app
        .users
        .login(&payload.name, &payload.password)
        .await?;

    Ok(Json(UserIdResponse { user_id }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ViewerQuery>,
) -> Result<Json<UserInfo>> {
    let info = state.app.users.user_info(id, query.viewer_id).await?;
    Ok(Json(info))
}
