//! Message API handlers: publish into a tenant's queue and cursor-paginated
//! reads across tenants.
use crate::api::error::{ApiError, api_internal, api_validation_error};
use crate::api::types::{MessageRecord, MessagesResponse, StatusResponse};
use crate::api::{bind_json, parse_uuid};
use crate::app::AppState;
use crate::model::Message;
use crate::service::ServiceError;
use crate::store::StoreError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_FETCH_LIMIT: i64 = 1;

#[utoipa::path(
    post,
    path = "/api/messages/{tenant_id}",
    tag = "messages",
    params(("tenant_id" = Uuid, Path, description = "Tenant identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Message accepted", body = StatusResponse),
        (status = 400, description = "Invalid payload or tenant id", body = crate::api::types::ErrorResponse),
        (status = 500, description = "Store or broker failure", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn publish_message(
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let tenant_id = parse_uuid(&tenant_id)?;
    // The payload must be a JSON object; it is otherwise opaque.
    let payload: serde_json::Map<String, serde_json::Value> =
        bind_json(&body).map_err(|_| api_validation_error("invalid json payload"))?;
    state
        .messages
        .publish(tenant_id, &payload)
        .await
        .map_err(|err| api_internal("failed to publish message", &err))?;
    Ok(Json(StatusResponse {
        message: "message sent successfully".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "messages",
    params(
        ("cursor" = Option<String>, Query, description = "Opaque pagination cursor"),
        ("limit" = Option<i64>, Query, description = "Page size")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "One page of messages", body = MessagesResponse),
        (status = 400, description = "Invalid cursor or limit", body = crate::api::types::ErrorResponse),
        (status = 500, description = "Store failure", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_messages(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let cursor = params.get("cursor").map(String::as_str).unwrap_or("");
    let limit = match params.get("limit") {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| api_validation_error("invalid 'limit' parameter, must be an integer"))?,
        None => DEFAULT_FETCH_LIMIT,
    };

    let page = match state.messages.fetch(cursor, limit).await {
        Ok(page) => page,
        Err(ServiceError::InvalidLimit) => {
            return Err(api_validation_error("limit must be greater than zero"));
        }
        Err(ServiceError::Store(StoreError::InvalidCursor(err))) => {
            return Err(api_validation_error(&err.to_string()));
        }
        Err(err) => return Err(api_internal("failed to fetch messages", &err)),
    };

    Ok(Json(MessagesResponse {
        data: page.messages.iter().map(record_from_message).collect(),
        next_cursor: page.next_cursor,
    }))
}

// Payload bytes are stored unparsed; for the response they are surfaced as
// the JSON value they encode.
fn record_from_message(message: &Message) -> MessageRecord {
    let payload = serde_json::from_slice(&message.payload).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&message.payload).into_owned())
    });
    MessageRecord {
        id: message.id,
        tenant_id: message.tenant_id,
        payload,
        created_at: message.created_at,
    }
}
