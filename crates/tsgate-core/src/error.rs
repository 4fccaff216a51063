//! Error types for tsgate.
//!
//! Every collaborator failure is mapped onto one of these variants so that
//! handlers can translate it into an HTTP status without inspecting strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The engine token lacks permission for the operation.
    #[error("Insufficient permissions: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource already exists (duplicate bucket or task name).
    #[error("Already exists: {0}")]
    Conflict(String),

    /// A non-success response from the engine, status and body verbatim.
    #[error("Upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The collaborator call exceeded its deadline.
    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    /// Transport failure talking to the engine.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code a handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Auth(_) => 401,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Upstream { status, .. } => *status,
            Error::Timeout(_) => 504,
            Error::Http(_) => 502,
            Error::Json(_) | Error::Config(_) | Error::Internal(_) => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Http(_) => true,
            Error::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Missing or insufficient engine permissions.
    pub fn is_auth(&self) -> bool {
        match self {
            Error::Auth(_) => true,
            Error::Upstream { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Upstream { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// The resource already exists. The engine answers a duplicate bucket
    /// with either 409 or 422 "already exists".
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Upstream { status: 409, .. } => true,
            Error::Upstream { status: 422, body } => body.contains("already exists"),
            _ => false,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("x").status_code(), 400);
        assert_eq!(Error::Auth("x".into()).status_code(), 401);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Timeout("x".into()).status_code(), 504);
        let upstream = Error::Upstream {
            status: 422,
            body: "{}".into(),
        };
        assert_eq!(upstream.status_code(), 422);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout("write".into()).is_retryable());
        assert!(Error::Upstream {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!Error::Upstream {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!Error::Auth("nope".into()).is_retryable());
        assert!(!Error::validation("bad").is_retryable());
    }

    #[test]
    fn test_engine_rejections_classify_by_status() {
        let rejected = |status: u16, body: &str| Error::Upstream {
            status,
            body: body.into(),
        };
        assert!(rejected(401, "{}").is_auth());
        assert!(rejected(403, "{}").is_auth());
        assert!(Error::Auth("x".into()).is_auth());
        assert!(rejected(404, "{}").is_not_found());
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(rejected(409, "{}").is_conflict());
        assert!(rejected(422, r#"{"message":"bucket with name raw already exists"}"#).is_conflict());
        assert!(!rejected(422, r#"{"message":"bad flux"}"#).is_conflict());
        assert!(!rejected(500, "{}").is_auth());
    }
}
