//! API error types and helpers.
//!
//! Centralizes HTTP error response construction so every failure surfaces as
//! `{"error": "..."}` with a status from the error-mapping table.
use crate::api::types::ErrorResponse;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            error: message.to_string(),
        },
    }
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, message)
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, message)
}

pub fn api_internal(message: &str, err: &dyn std::error::Error) -> ApiError {
    tracing::error!(error = %err, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}
