//! Clipfeed Server Library
//!
//! Cache-consistency layer of a short-video feed service: existence
//! filtering, coalesced cache-aside reads, delayed double-delete
//! invalidation and time-bucketed feed pages.

pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod relations;
pub mod routes;
pub mod security;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::App;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use db::StoreGateway;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub app: App,
    pub store: Arc<dyn StoreGateway>,
}

impl AppState {
    pub fn new(app: App, store: Arc<dyn StoreGateway>) -> Self {
        Self { app, store }
    }
}

/// Router with every endpoint; transport layers are added by the caller
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/feed", get(routes::get_feed))
        .route("/video", post(routes::publish_video))
        .route(
            "/video/:id",
            get(routes::get_video).put(routes::update_video),
        )
        .route("/favorite", post(routes::set_favorite))
        .route("/user/register", post(routes::register_user))
        .route("/user/login", post(routes::login_user))
        .route("/user/:id", get(routes::get_user))
        .with_state(state)
}
