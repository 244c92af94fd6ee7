//! Login endpoint: issues bearer tokens for the mock identity in the body.
use crate::api::bind_json;
use crate::api::error::{ApiError, api_internal, api_validation_error};
use crate::api::types::{LoginRequest, LoginResponse};
use crate::app::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;

#[utoipa::path(
    post,
    path = "/api/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Invalid request", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LoginResponse>, ApiError> {
    let request: LoginRequest = bind_json(&body)?;
    if request.user_id.is_empty() || request.tenant_id.is_empty() {
        return Err(api_validation_error("invalid request"));
    }
    let token = state
        .tokens
        .mint(&request.user_id, &request.tenant_id)
        .map_err(|err| api_internal("failed to generate token", &err))?;
    Ok(Json(LoginResponse { token }))
}
