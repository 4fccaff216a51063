//! POST /query: a tenant's records over a window, as JSON.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use tsgate_core::Error;
use tsgate_engine::{flatten_records, FluxRecord};
use tsgate_query::TimeWindow;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(query))
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default, alias = "user_id")]
    tenant_id: String,
    /// Optional explicit window; both bounds or neither.
    start: Option<DateTime<Utc>>,
    stop: Option<DateTime<Utc>>,
}

async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryBody>, JsonRejection>,
) -> Result<Json<Vec<FluxRecord>>, ApiError> {
    let Json(body) = payload?;
    let window = match (body.start, body.stop) {
        (Some(start), Some(stop)) => Some(TimeWindow::new(start, stop)?),
        (None, None) => None,
        _ => return Err(Error::validation("start and stop must be given together").into()),
    };

    let tenant_query = state
        .queries
        .tenant_query(&body.tenant_id, &state.config.raw_bucket, window)?;
    let tables = state.engine.query(&tenant_query.query).await?;
    debug!(
        "Query for {} returned {} tables",
        tenant_query.tenant_id,
        tables.len()
    );
    Ok(Json(flatten_records(tables)))
}
