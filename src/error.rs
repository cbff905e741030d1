/// Unified error types for the Skein engine
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum SkeinError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors (non-owner edit/delete)
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors (empty/oversized content, missing fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (duplicate like, duplicate repost, self-repost)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Visibility denied. Surfaced to clients as not-found so that the
    /// existence of private content is not leaked.
    #[error("Private content: {0}")]
    Privacy(String),

    /// Integrity errors (corrupted reply graph)
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Failures of external collaborators (email, push). Always caught and
    /// logged by the dispatching code, never propagated to callers.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert SkeinError to HTTP response
impl IntoResponse for SkeinError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            SkeinError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            SkeinError::Authorization(_) => {
                (StatusCode::FORBIDDEN, "Forbidden", self.to_string())
            }
            SkeinError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            SkeinError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            // Indistinguishable from a missing record on the wire
            SkeinError::Privacy(_) => {
                (StatusCode::NOT_FOUND, "NotFound", "Not found".to_string())
            }
            SkeinError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            SkeinError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            SkeinError::Database(_)
            | SkeinError::Internal(_)
            | SkeinError::Integrity(_)
            | SkeinError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                self.to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl SkeinError {
    /// True when the underlying database error is a unique-constraint
    /// violation. Duplicate likes and reposts surface this way instead of
    /// through a read-then-write existence check.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SkeinError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Result type alias for engine operations
pub type SkeinResult<T> = Result<T, SkeinError>;
