//! Daemon and API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bdtp_types::EngineError;
use serde_json::json;
use thiserror::Error;

/// Errors raised during daemon startup and shutdown.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors returned to API callers, mapped onto HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::SessionNotFound(_) | EngineError::NotListed(_) => {
                ApiError::NotFound(err.to_string())
            }
            EngineError::InvalidSessionId(_)
            | EngineError::InvalidAddress(_)
            | EngineError::InvalidAmount(_)
            | EngineError::SubjectCount { .. }
            | EngineError::MissingBuyerKey
            | EngineError::MalformedKey(_) => ApiError::BadRequest(err.to_string()),
            EngineError::RequirementAlreadySet | EngineError::InvalidTransition { .. } => {
                ApiError::Conflict(err.to_string())
            }
            EngineError::Unavailable(_) => ApiError::Unavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "API request failed");
        }

        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
