//! GET /visualize?user_name=<tenant>: HTML line chart of the tenant's data.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::error::ApiError;
use crate::render;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/visualize", get(visualize))
}

#[derive(Debug, Deserialize)]
struct VisualizeParams {
    #[serde(default, alias = "tenant_id")]
    user_name: String,
}

async fn visualize(
    State(state): State<Arc<AppState>>,
    params: Result<Query<VisualizeParams>, QueryRejection>,
) -> Result<Html<String>, ApiError> {
    let Query(params) = params?;
    let tenant_query = state
        .queries
        .tenant_query(&params.user_name, &state.config.raw_bucket, None)?;
    let frame = state.engine.query_frame(&tenant_query.query).await?;
    Ok(Html(render::chart_page(&tenant_query.tenant_id, &frame)))
}
