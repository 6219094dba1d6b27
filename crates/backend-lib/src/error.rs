// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use vplan_common::ErrorEnvelope;

/// Every failure a handler can end with.
///
/// `Unauthorized` and `RateLimited` carry no detail: the
/// envelope message stays blank for them.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("{0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::Storage(_) | AppError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Text placed into the envelope
    pub fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::Internal(msg) => msg.clone(),
            AppError::Unauthorized | AppError::RateLimited => String::new(),
            AppError::Storage(e) => e.to_string(),
            AppError::Join(e) => e.to_string(),
        }
    }

    /// Whether the failure is on our side rather than the client's
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_internal() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorEnvelope::new(status.as_u16(), self.public_message());
        (status, Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
