//! # Centralized Error Handling
//!
//! Defines the application-wide error type [`AppError`], used consistently across
//! the resolution pipeline, the store/cache/oracle adapters, and the service surface.
//! Mirrors §7 of the specification: each pipeline-level error kind below maps to
//! exactly one `AppError` variant and one HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application-wide error type.
///
/// - `Validation` — malformed input or unsupported network. 4xx, no retry.
/// - `OracleTransient` — timeout, 5xx, rate-limit from the upstream oracle. Never
///   surfaced to the caller directly; the pipeline falls through to interpolation
///   and then the queue instead.
/// - `OracleDefinitive` — the oracle definitively has nothing (unknown token).
/// - `InterpolationDeclined` — insufficient or low-confidence data.
/// - `Store` — durable store unreachable or a write was rejected.
/// - `Cache` — cache unavailable; degrades correctness never, performance only.
/// - `NotFound` / `Internal` — generic fallbacks.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("oracle transient error: {0}")]
    OracleTransient(String),

    #[error("oracle has no data: {0}")]
    OracleDefinitive(String),

    #[error("interpolation declined: {0}")]
    InterpolationDeclined(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error maps to, per §7/§8.4.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::OracleDefinitive(_) | AppError::InterpolationDeclined(_) => {
                StatusCode::ACCEPTED
            }
            AppError::OracleTransient(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Cache(_) => StatusCode::OK,
        }
    }

    /// User-facing message. Internal errors never leak their cause.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::OracleDefinitive(_) | AppError::InterpolationDeclined(_) => {
                "price not available yet, request queued".to_string()
            }
            AppError::OracleTransient(_) => "upstream oracle temporarily unavailable".to_string(),
            AppError::Store(_) => "storage layer unavailable".to_string(),
            AppError::Cache(msg) => msg.clone(),
            AppError::Internal(_) => "an internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                tracing::debug!("client error: {self}");
            }
            StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY => {
                tracing::error!("server error: {self}");
            }
            _ => tracing::warn!("unexpected error path: {self}"),
        }

        let message = self.user_message();
        let body = Json(json!({
            "success": false,
            "message": message,
        }));
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("record not found".to_string()),
            other => AppError::Store(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Cache(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::OracleTransient(err.to_string())
    }
}
