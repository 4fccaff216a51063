//! GET /monitor: usage totals and task health as HTML.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use tsgate_monitor::HealthReport;

use crate::error::ApiError;
use crate::render;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/monitor", get(monitor))
        .route("/monitor/report", get(report))
}

async fn monitor(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let report = state.monitor.produce_report().await?;
    Ok(Html(render::monitor_page(&report)))
}

/// GET /monitor/report: the same report as JSON.
async fn report(State(state): State<Arc<AppState>>) -> Result<Json<HealthReport>, ApiError> {
    Ok(Json(state.monitor.produce_report().await?))
}
