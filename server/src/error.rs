use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy (§7). Each variant maps to exactly one HTTP status; the
/// envelope shape is fixed across all of them (§6 "Error envelope").
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation { details: Vec<String> },

    #[error("authentication required")]
    AuthRequired { code: Option<&'static str> },

    #[error("forbidden")]
    Forbidden { code: Option<&'static str> },

    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("throttled")]
    Throttled { retry_after_ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "retryAfterMs")]
    retry_after_ms: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, code, details, retry_after_ms) = match self {
            AppError::Validation { details } => (
                StatusCode::BAD_REQUEST,
                "validation failed".to_string(),
                None,
                Some(details),
                None,
            ),
            AppError::AuthRequired { code } => (
                StatusCode::UNAUTHORIZED,
                "authentication required".to_string(),
                code,
                None,
                None,
            ),
            AppError::Forbidden { code } => (
                StatusCode::FORBIDDEN,
                "forbidden".to_string(),
                code,
                None,
                None,
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "not found".to_string(),
                None,
                None,
                None,
            ),
            AppError::Conflict => (
                StatusCode::CONFLICT,
                "conflict".to_string(),
                None,
                None,
                None,
            ),
            AppError::Throttled { retry_after_ms } => (
                StatusCode::TOO_MANY_REQUESTS,
                "throttled".to_string(),
                Some("THROTTLED"),
                None,
                Some(retry_after_ms),
            ),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal_error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                    None,
                    None,
                    None,
                )
            }
        };

        let body = ErrorEnvelope {
            error,
            code,
            details,
            retry_after_ms,
        };
        (status, Json(body)).into_response()
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(e: mongodb::error::Error) -> Self {
        AppError::Internal(format!("store error: {e}"))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Internal(format!("cache error: {e}"))
    }
}

/// The store/cache traits report failure as `anyhow::Error` (§9 "capability
/// trait" design) so handlers can use `?` directly against them; anything
/// that reaches here is a store-layer failure with no more specific variant.
impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn throttled_maps_to_429_with_retry_after() {
        let err = AppError::Throttled {
            retry_after_ms: 1000,
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn auth_required_distinguishes_token_expired() {
        let err = AppError::AuthRequired {
            code: Some("TOKEN_EXPIRED"),
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validation_reports_all_details() {
        let err = AppError::Validation {
            details: vec!["lat".into(), "lng".into()],
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
