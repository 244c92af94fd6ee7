//! Tenant API handlers: creation, deletion, and concurrency updates, with
//! consistent error mapping for runtime failures.
use crate::api::error::{ApiError, api_internal, api_not_found, api_validation_error};
use crate::api::types::{ConcurrencyRequest, CreateTenantRequest, StatusResponse};
use crate::api::{bind_json, parse_uuid};
use crate::app::AppState;
use crate::model::Tenant;
use crate::runtime::RuntimeError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/tenants",
    tag = "tenants",
    request_body = CreateTenantRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Tenant created", body = Tenant),
        (status = 400, description = "Invalid request", body = crate::api::types::ErrorResponse),
        (status = 500, description = "Provisioning failed", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_tenant(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: CreateTenantRequest = bind_json(&body)?;
    let tenant = Tenant {
        id: Uuid::new_v4(),
        name: request.name,
    };
    state
        .runtime
        .create_tenant(tenant.id, &tenant.name)
        .await
        .map_err(|err| api_internal("failed to create tenant", &err))?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

#[utoipa::path(
    delete,
    path = "/api/tenants/{id}",
    tag = "tenants",
    params(("id" = Uuid, Path, description = "Tenant identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Tenant deleted"),
        (status = 404, description = "Tenant not found", body = crate::api::types::ErrorResponse),
        (status = 500, description = "Teardown failed", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_tenant(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let tenant_id = parse_uuid(&id)?;
    match state.runtime.delete_tenant(tenant_id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(RuntimeError::TenantNotFound) => Err(api_not_found("tenant not found")),
        Err(err) => Err(api_internal("failed to delete tenant", &err)),
    }
}

#[utoipa::path(
    put,
    path = "/api/tenants/{id}/config/concurrency",
    tag = "tenants",
    params(("id" = Uuid, Path, description = "Tenant identifier")),
    request_body = ConcurrencyRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Concurrency updated", body = StatusResponse),
        (status = 400, description = "Invalid worker count", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Tenant not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_concurrency(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let tenant_id = parse_uuid(&id)?;
    let request: ConcurrencyRequest = bind_json(&body)?;
    if request.workers <= 0 {
        return Err(api_validation_error(
            "invalid request: 'workers' must be a positive number",
        ));
    }
    match state
        .runtime
        .update_concurrency(tenant_id, request.workers as usize)
        .await
    {
        Ok(()) => Ok(Json(StatusResponse {
            message: "concurrency updated successfully".to_string(),
        })),
        Err(RuntimeError::TenantNotFound) => Err(api_not_found("tenant not found")),
        Err(RuntimeError::InvalidWorkerCount) => {
            Err(api_validation_error("invalid request: 'workers' must be a positive number"))
        }
        Err(err) => Err(api_internal("failed to update concurrency", &err)),
    }
}
