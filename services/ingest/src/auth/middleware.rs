//! Bearer-token guard for protected routes.
use crate::api::error::{ApiError, api_unauthorized};
use crate::app::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

/// Reject requests without a valid `Authorization: Bearer <token>` header.
///
/// Verified claims are attached to the request extensions for handlers that
/// want the caller identity.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let Some(token) = header.and_then(|header| header.strip_prefix("Bearer ")) else {
        return Err(api_unauthorized("missing or invalid token"));
    };
    let claims = state
        .tokens
        .verify(token)
        .map_err(|_| api_unauthorized("invalid token"))?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
