//! HTTP route handlers.

pub mod ingest;
pub mod monitor;
pub mod query;
pub mod tasks;
pub mod visualize;

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::render;
use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health))
        .merge(ingest::routes())
        .merge(query::routes())
        .merge(visualize::routes())
        .merge(tasks::routes())
        .merge(monitor::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /: welcome text.
async fn welcome() -> Html<String> {
    Html(render::welcome_page())
}

/// GET /health: engine reachability.
async fn health(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    state.engine.ping().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "engine": state.engine.name(),
    })))
}
