use crate::metrics::STORE_FAILURES_TOTAL;
use crate::validate::ValidationDetails;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Validation failed")]
    Validation(ValidationDetails),

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("Server error")]
    Internal(#[from] Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidJson | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotConfigured(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = match self {
            ApiError::Validation(details) => json!({
                "ok": false,
                "error": "Validation failed",
                "details": details,
            }),
            ApiError::Internal(e) => {
                // Details stay in the server log
                error!("API error: {}", e);
                STORE_FAILURES_TOTAL.inc();
                json!({ "ok": false, "error": "Server error" })
            }
            other => json!({ "ok": false, "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
