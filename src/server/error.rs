use axum::Json;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::kv::KvError;

/// Session service errors. Rendered as a JSON `{"error": ...}` envelope;
/// internal detail is logged, never sent to the client.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No valid session found.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Unknown or missing `action`.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Known action, wrong HTTP method.
    #[error("Method not allowed for action {0}")]
    MethodNotAllowed(String),

    #[error("Too many requests")]
    TooManyRequests { retry_after: u64 },

    /// Key-value store operation failed.
    #[error("Session store error: {0}")]
    Store(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": self.to_string() })))
                    .into_response()
            }
            Self::InvalidAction(_) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid action" })))
                    .into_response()
            }
            Self::MethodNotAllowed(_) => (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(json!({ "error": "Method not allowed" })),
            )
                .into_response(),
            Self::TooManyRequests { retry_after } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": "Too many requests" })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            Self::Config(_) => {
                tracing::error!(error = %self, "Auth configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Configuration error" })),
                )
                    .into_response()
            }
            Self::Store(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<crate::error::Error> for AuthError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::Config(msg) => Self::Config(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<KvError> for AuthError {
    fn from(e: KvError) -> Self {
        Self::Store(e.to_string())
    }
}
