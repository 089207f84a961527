//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::{LoginRequest, LoginResponse};
use crate::gateway::types::{
    ErrorData, ExecuteTransactionRequest, HealthResponse, LogoutResponseData,
    TransactionResponseData,
};
use crate::transaction::{Permissions, TransactionKind};

/// Session token issued by `/apiv1/login`
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
                        .description(Some(
                            "Session token from /apiv1/login. Valid while the server-side session is alive.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockgate API",
        version = "1.0.0",
        description = "Warehouse stock transactions (withdrawal, transfer, picking, correction) against the ERP."
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::login,
        crate::gateway::handlers::logout,
        crate::gateway::handlers::get_permissions,
        crate::gateway::handlers::execute_transaction,
        crate::gateway::handlers::health_check,
    ),
    components(
        schemas(
            LoginRequest,
            LoginResponse,
            LogoutResponseData,
            Permissions,
            TransactionKind,
            ExecuteTransactionRequest,
            TransactionResponseData,
            HealthResponse,
            ErrorData,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Operator login, logout and permissions"),
        (name = "Transactions", description = "Stock transactions (auth required)"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
