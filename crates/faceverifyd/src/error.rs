//! HTTP error types.

use crate::engine::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Two images are required")]
    MissingImages,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("invalid base64 image: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("temp file error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingImages => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let body = match self {
            Self::MissingImages => json!({ "error": message }),
            _ => {
                tracing::warn!(error = %message, "verification request failed");
                json!({ "error": message, "verified": false })
            }
        };
        (status, Json(body)).into_response()
    }
}
