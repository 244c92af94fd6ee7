//! HTTP application wiring.
//!
//! Builds the axum router, layers the bearer-token guard over protected
//! routes, and defines the shared application state injected into handlers.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth;
use crate::auth::TokenIssuer;
use crate::observability;
use crate::runtime::TenantRuntime;
use crate::service::MessageService;
use crate::store::MessageStore;
use axum::Router;
use axum::routing::{delete, get, post, put};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<TenantRuntime>,
    pub messages: Arc<MessageService>,
    pub store: Arc<dyn MessageStore>,
    pub tokens: TokenIssuer,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    let protected = Router::new()
        .route("/api/tenants", post(api::tenants::create_tenant))
        .route("/api/tenants/:id", delete(api::tenants::delete_tenant))
        .route(
            "/api/tenants/:id/config/concurrency",
            put(api::tenants::update_concurrency),
        )
        .route(
            "/api/messages/:tenant_id",
            post(api::messages::publish_message),
        )
        .route("/api/messages", get(api::messages::get_messages))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_bearer,
        ));

    Router::new()
        .route("/api/login", post(api::login::login))
        .route("/api/system/health", get(api::system::health))
        .merge(protected)
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs")
                .url("/api/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
