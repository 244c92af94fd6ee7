//! OpenAPI document for the HTTP surface.
use crate::api;
use crate::api::types::{
    ConcurrencyRequest, CreateTenantRequest, ErrorResponse, HealthResponse, LoginRequest,
    LoginResponse, MessageRecord, MessagesResponse, StatusResponse,
};
use crate::model::Tenant;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "hive-ingest",
        version = "v1",
        description = "Multi-tenant message ingestion API"
    ),
    modifiers(&SecurityAddon),
    paths(
        api::system::health,
        api::login::login,
        api::tenants::create_tenant,
        api::tenants::delete_tenant,
        api::tenants::update_concurrency,
        api::messages::publish_message,
        api::messages::get_messages
    ),
    components(schemas(
        ErrorResponse,
        HealthResponse,
        LoginRequest,
        LoginResponse,
        CreateTenantRequest,
        Tenant,
        ConcurrencyRequest,
        StatusResponse,
        MessageRecord,
        MessagesResponse
    )),
    tags(
        (name = "system", description = "Health and discovery"),
        (name = "auth", description = "Token issuance"),
        (name = "tenants", description = "Tenant lifecycle and concurrency"),
        (name = "messages", description = "Publish and cursor-paginated reads")
    )
)]
pub struct ApiDoc;
