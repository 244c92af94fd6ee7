//! Liveness endpoint.
use crate::api::error::{ApiError, api_internal};
use crate::api::types::HealthResponse;
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/api/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Service health", body = HealthResponse),
        (status = 500, description = "Storage unavailable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state
        .store
        .health_check()
        .await
        .map_err(|err| api_internal("storage unavailable", &err))?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}
