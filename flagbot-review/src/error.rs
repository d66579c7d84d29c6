//! Error types for the review service's HTTP surface
//!
//! Expected rejections carry a short message. Anything unexpected is logged
//! in full and answered with a correlation hash only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. duplicate reviewer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Feature not configured (503)
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// flagbot-common error
    #[error(transparent)]
    Common(#[from] flagbot_common::Error),
}

/// Short stable reference for an unexpected error
pub fn correlation_hash(detail: &str) -> String {
    let digest = Sha256::digest(detail.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use flagbot_common::Error as Common;

        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg),
            ApiError::Common(Common::NotFound(msg)) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Common(Common::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(Common::Constraint(msg)) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Common(err) => {
                let detail = format!("{:?}", err);
                let hash = correlation_hash(&detail);
                error!(hash = %hash, error = %err, detail = %detail, "Unexpected command error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    format!("Something went wrong (ref {})", hash),
                )
            }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_hash_is_short_and_stable() {
        let a = correlation_hash("Database error: disk I/O");
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, correlation_hash("Database error: disk I/O"));
        assert_ne!(a, correlation_hash("Database error: locked"));
    }

    #[test]
    fn test_constraint_maps_to_conflict() {
        let response =
            ApiError::from(flagbot_common::Error::Constraint("dup".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response =
            ApiError::from(flagbot_common::Error::Internal("boom".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
