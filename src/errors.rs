use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("value is a required field")]
    MissingValue,

    #[error("malformed request body: {0}")]
    MalformedInput(String),

    #[error("token not found")]
    TokenNotFound,

    #[error("token has expired")]
    TokenExpired,

    #[error("unauthorized")]
    Unauthorized,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("session error: {0}")]
    Session(anyhow::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingValue | AppError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            AppError::TokenNotFound => StatusCode::NOT_FOUND,
            AppError::TokenExpired => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Store(_) | AppError::Session(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// User-facing message. Internal kinds never expose their cause.
    pub fn message(&self) -> String {
        match self {
            AppError::Store(_) | AppError::Session(_) | AppError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// True for the four outcomes an exchange attempt can be rejected with.
    pub fn is_classified(&self) -> bool {
        matches!(
            self,
            AppError::MissingValue
                | AppError::MalformedInput(_)
                | AppError::TokenNotFound
                | AppError::TokenExpired
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Store(e) => tracing::error!("Store error: {}", e),
            AppError::Session(e) => tracing::error!("Session error: {:#}", e),
            AppError::Internal(e) => tracing::error!("Internal error: {:#}", e),
            _ => {}
        }

        let status = self.status();
        let body = Json(json!({
            "code": status.as_u16(),
            "message": self.message(),
        }));

        (status, body).into_response()
    }
}
