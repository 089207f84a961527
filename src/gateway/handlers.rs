//! HTTP handlers
//!
//! Thin adapters: decode, call the core, wrap the result in `ApiResponse`.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use tracing::{info, warn};

use super::middleware::{Operator, bearer_token};
use super::state::AppState;
use super::types::{
    ApiError, ApiResponse, ExecuteTransactionRequest, HealthResponse, LogoutResponseData,
    TransactionResponseData,
};
use crate::auth::{LoginRequest, LoginResponse};
use crate::erp::CredentialStatus;
use crate::session::token_tag;
use crate::transaction::{Permissions, permissions};

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

/// Operator login
///
/// Checks app access and device approval, opens an ERP session and returns
/// the session token. An unknown device is registered and refused until an
/// administrator approves it.
#[utoipa::path(
    post,
    path = "/apiv1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "ERP rejected the credentials"),
        (status = 403, description = "No app access or device pending approval"),
        (status = 404, description = "Unknown user")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let req = json_body(body)?;
    info!(username = %req.username, "Login attempt");
    let resp = state.auth.login(req).await?;
    Ok(Json(ApiResponse::success(resp)))
}

/// Operator logout. Idempotent.
#[utoipa::path(
    post,
    path = "/apiv1/logout",
    responses(
        (status = 200, description = "Session dropped", body = LogoutResponseData),
        (status = 401, description = "Missing token"),
        (status = 503, description = "Session store unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<LogoutResponseData>>, ApiError> {
    let token = bearer_token(&headers)?;
    let revoked = state.auth.logout(token).await?;
    info!(token = token_tag(token), revoked, "Logout");
    Ok(Json(ApiResponse::success(LogoutResponseData { revoked })))
}

/// Current operator permissions, read fresh from the ERP
#[utoipa::path(
    get,
    path = "/apiv1/permissions",
    responses(
        (status = 200, description = "Permission record", body = Permissions),
        (status = 401, description = "Invalid token or expired session"),
        (status = 403, description = "No permission record")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn get_permissions(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
) -> Result<Json<ApiResponse<Permissions>>, ApiError> {
    let perms = permissions::lookup(state.erp.as_ref(), operator.claims.codusu).await?;
    Ok(Json(ApiResponse::success(perms)))
}

/// Run one stock transaction under the operator's ERP session
///
/// `type` is one of `baixa`, `transferencia`, `picking`, `correcao`.
/// A 401 with `reauthRequired` means the ERP session is gone and the
/// operator must log in again.
#[utoipa::path(
    post,
    path = "/apiv1/execute-transaction",
    request_body = ExecuteTransactionRequest,
    responses(
        (status = 200, description = "Transaction completed", body = TransactionResponseData),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Expired session or reauthentication required"),
        (status = 403, description = "Permission denied"),
        (status = 404, description = "Origin not found"),
        (status = 409, description = "Destination holds a different product"),
        (status = 502, description = "ERP rejected the operation"),
        (status = 504, description = "Batch not confirmed in time")
    ),
    security(("bearer_auth" = [])),
    tag = "Transactions"
)]
pub async fn execute_transaction(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
    body: Result<Json<ExecuteTransactionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<TransactionResponseData>>, ApiError> {
    let req = json_body(body)?;

    let run = state.orchestrator.execute(
        req.kind,
        req.payload,
        operator.claims.codusu,
        &operator.session_handle,
    );
    let message = tokio::time::timeout(state.request_timeout, run)
        .await
        .map_err(|_| ApiError::timeout(state.request_timeout.as_secs()))??;

    Ok(Json(ApiResponse::success(TransactionResponseData { message })))
}

/// Health check
#[utoipa::path(
    get,
    path = "/apiv1/health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse)
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthResponse>> {
    let (credential_status, credential_expires_in_secs) = match state.erp.credential_status().await {
        CredentialStatus::Valid { expires_in } => ("valid", Some(expires_in.as_secs())),
        CredentialStatus::Expired => ("expired", None),
        CredentialStatus::Missing => ("missing", None),
    };

    let (status, active_sessions) = match state.sessions.count_active().await {
        Ok(n) => ("online", n),
        Err(e) => {
            warn!(error = %e, "Health check could not reach the session store");
            ("degraded", 0)
        }
    };

    Json(ApiResponse::success(HealthResponse {
        status: status.to_string(),
        version: format!("{}+{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
        uptime_seconds: state.uptime().as_secs(),
        active_sessions,
        credential_status: credential_status.to_string(),
        credential_expires_in_secs,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}
