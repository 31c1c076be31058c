//! Error types for gmp-ms

use crate::query::QueryError;
use crate::session::TimelineError;
use crate::video::CorrelatorError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Malformed page request (400)
    #[error("Invalid page request: {0}")]
    InvalidPageRequest(String),

    /// Conflict (409), e.g. duplicate patient id
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Acquisition store could not be consulted (502)
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    /// gmp-common error
    #[error("Common error: {0}")]
    Common(#[from] gmp_common::Error),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidPageRequest(msg) => ApiError::InvalidPageRequest(msg),
            QueryError::LookupFailed(msg) => ApiError::LookupFailed(msg),
        }
    }
}

impl From<CorrelatorError> for ApiError {
    fn from(err: CorrelatorError) -> Self {
        ApiError::LookupFailed(err.to_string())
    }
}

impl From<TimelineError> for ApiError {
    fn from(err: TimelineError) -> Self {
        ApiError::LookupFailed(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::InvalidPageRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_PAGE_REQUEST", msg)
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::LookupFailed(msg) => (StatusCode::BAD_GATEWAY, "LOOKUP_FAILED", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
