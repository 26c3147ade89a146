use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Health check endpoint
///
/// Reports store reachability and how many deferred cache tasks are pending.
/// Cache tiers are not probed: they are allowed to fail.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_status = match state.store.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            "disconnected"
        }
    };

    Json(json!({
        "status": if db_status == "connected" { "healthy" } else { "unhealthy" },
        "database": db_status,
        "pending_invalidations": state.app.scheduler.pending(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
