use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::state::AppState;
use super::types::ApiError;
use crate::auth::Claims;
use crate::session::token_tag;

/// Authenticated operator, injected by [`session_auth_middleware`]
#[derive(Debug, Clone)]
pub struct Operator {
    pub claims: Claims,
    /// ERP session handle owned by this login
    pub session_handle: String,
}

pub(super) fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(ApiError::missing_auth)
}

/// JWT + session check. Every authenticated request slides the session TTL.
pub async fn session_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?;
    let (claims, session_handle) = state.auth.authenticate(token).await?;
    debug!(cod_usu = claims.codusu, token = token_tag(token), "Session refreshed");

    request.extensions_mut().insert(Operator {
        claims,
        session_handle,
    });
    Ok(next.run(request).await)
}
