//! HTTP gateway
//!
//! ```text
//! /apiv1/login                  public
//! /apiv1/logout                 bearer token only
//! /apiv1/health                 public
//! /apiv1/permissions            JWT + live session
//! /apiv1/execute-transaction    JWT + live session
//! ```

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod state;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use middleware::Operator;
pub use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/permissions", get(handlers::get_permissions))
        .route("/execute-transaction", post(handlers::execute_transaction))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::session_auth_middleware,
        ));

    let api = Router::new()
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/health", get(handlers::health_check))
        .merge(protected);

    Router::new()
        .nest("/apiv1", api)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve until `shutdown` resolves
pub async fn run_server<F>(
    host: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    info!(%addr, "Gateway listening");
    info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
