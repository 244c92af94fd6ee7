//! Request and response records for the HTTP API.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginRequest {
    pub user_id: String,
    pub tenant_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateTenantRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ConcurrencyRequest {
    pub workers: i64,
}

/// Generic `{message}` acknowledgement body.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct StatusResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MessageRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MessagesResponse {
    pub data: Vec<MessageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ErrorResponse {
    pub error: String,
}
