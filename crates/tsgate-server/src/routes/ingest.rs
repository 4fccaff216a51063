//! POST /ingest: write one telemetry point for a tenant.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tsgate_ingest::PointRequest;

use crate::error::ApiError;
use crate::state::AppState;

/// Name of the single field written by this endpoint.
const FIELD_NAME: &str = "field1";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ingest", post(ingest))
}

#[derive(Debug, Deserialize)]
struct IngestBody {
    #[serde(default, alias = "user_id")]
    tenant_id: String,
    #[serde(default)]
    measurement: String,
    #[serde(default)]
    field1: serde_json::Value,
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = payload?;
    let request = PointRequest::new(body.tenant_id, body.measurement, FIELD_NAME, body.field1);
    state.ingester.ingest(&request).await?;
    Ok(Json(serde_json::json!({ "result": "data accepted for processing" })))
}
