//! HTTP API module: route handlers and shared binding helpers.
//!
//! Handlers bind bodies and path/query parameters explicitly so every
//! malformed input maps to a 400 with the standard error shape, then
//! delegate to the runtime controller or the message service.
use crate::api::error::{ApiError, api_validation_error};
use axum::body::Bytes;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub mod error;
pub mod login;
pub mod messages;
pub mod openapi;
pub mod system;
pub mod tenants;
pub mod types;

/// Bind a JSON body to a typed record; malformed input is a 400.
pub(crate) fn bind_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| api_validation_error("invalid request body"))
}

/// Parse a path UUID; malformed input is a 400.
pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| api_validation_error("invalid tenant id"))
}
