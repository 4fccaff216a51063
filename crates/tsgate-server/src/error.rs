//! Error → HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};
use tsgate_core::Error;

/// Wrapper so handlers can return `Result<_, ApiError>` and use `?` on
/// gateway errors.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    fn message(&self) -> String {
        match &self.0 {
            Error::Validation(m)
            | Error::Auth(m)
            | Error::NotFound(m)
            | Error::Conflict(m)
            | Error::Timeout(m)
            | Error::Http(m) => m.clone(),
            Error::Upstream { body, .. } => serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_else(|| body.clone()),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let mut body = serde_json::json!({ "error": self.message() });
        if self.0.is_retryable() {
            body["retryable"] = serde_json::Value::Bool(true);
        }
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::Auth("x".into()), StatusCode::UNAUTHORIZED),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (
                Error::Upstream {
                    status: 422,
                    body: "bad flux".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_message_is_unprefixed() {
        let err = ApiError(Error::NotFound("Bucket raw does not exist".into()));
        assert_eq!(err.message(), "Bucket raw does not exist");
    }

    #[test]
    fn test_engine_message_is_extracted() {
        let err = ApiError(Error::Upstream {
            status: 401,
            body: r#"{"code":"unauthorized","message":"unauthorized access"}"#.into(),
        });
        assert_eq!(err.message(), "unauthorized access");

        let err = ApiError(Error::Upstream {
            status: 502,
            body: "bad gateway".into(),
        });
        assert_eq!(err.message(), "bad gateway");
    }
}
