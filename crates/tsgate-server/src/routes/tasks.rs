//! POST /tasks: register the tenant's periodic downsampling task.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;
use tsgate_core::{Error, FluxDuration};
use tsgate_query::Predicate;
use tsgate_tasks::TaskRequest;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tasks", post(register))
}

#[derive(Debug, Deserialize)]
struct TaskBody {
    #[serde(default, alias = "user_id")]
    tenant_id: String,
    /// Flux duration literal; defaults to the configured schedule.
    schedule: Option<String>,
}

async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TaskBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let schedule = match body.schedule.as_deref() {
        Some(literal) => FluxDuration::parse(literal)?,
        None => state.config.task_schedule.clone(),
    };
    let request = TaskRequest {
        tenant_id: body.tenant_id,
        source_bucket: state.config.raw_bucket.clone(),
        sink_bucket: state.config.processed_bucket.clone(),
        schedule,
        predicate: Predicate::zero_value(),
    };

    match state.registrar.register(&request).await {
        Ok(task_id) => Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({ "task_id": task_id })),
        )
            .into_response()),
        // Engine rejections are handed back as the engine phrased them.
        Err(Error::Upstream { status, body }) => {
            warn!("Task registration rejected by engine ({}): {}", status, body);
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = if serde_json::from_str::<serde_json::Value>(&body).is_ok() {
                "application/json"
            } else {
                "text/plain; charset=utf-8"
            };
            Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
        }
        Err(e) => Err(e.into()),
    }
}
