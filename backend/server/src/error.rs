use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("User already exists")]
    Conflict,

    #[error("Payment verification failed")]
    PaymentVerification,

    #[error("Payment already used")]
    PaymentAlreadyUsed,

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentVerification => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict | AppError::PaymentAlreadyUsed => StatusCode::CONFLICT,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Server side failures are logged here and never echoed to clients
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Failures that keep the server from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Redis unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
