//! API Response types and error mapping
//!
//! - `ApiResponse<T>`: unified response wrapper
//! - `ApiError`: any handler failure, rendered as an `ApiResponse<ErrorData>`
//! - `error_codes`: numeric codes carried in `ApiResponse::code`

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::transaction::{TransactionError, TransactionKind};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: payload on success, error details on failure
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }
}

/// Error details
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    /// Stable error code, e.g. `SESSION_INSTABILITY`
    #[schema(example = "PERMISSION_DENIED")]
    pub error: String,
    /// The client must log in again before retrying
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reauth_required: bool,
    /// Device token awaiting approval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// Execute-transaction request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExecuteTransactionRequest {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[schema(value_type = Object)]
    pub payload: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponseData {
    #[schema(example = "Operação concluída com sucesso!")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponseData {
    /// Whether a live session was dropped
    pub revoked: bool,
}

/// Health check response data
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "online")]
    pub status: String,
    /// Build revision
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
    /// `valid`, `expired` or `missing`
    #[schema(example = "valid")]
    pub credential_status: String,
    /// Seconds until the system credential expires, when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_expires_in_secs: Option<u64>,
    /// RFC 3339
    pub timestamp: String,
}

// ============================================================================
// Error Codes
// ============================================================================

pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const SESSION_EXPIRED: i32 = 2003;
    pub const REAUTH_REQUIRED: i32 = 2004;

    // Authorization errors (3xxx)
    pub const PERMISSION_DENIED: i32 = 3001;
    pub const DEVICE_PENDING_APPROVAL: i32 = 3002;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4009;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const UPSTREAM_ERROR: i32 = 5002;
    pub const TIMEOUT: i32 = 5004;
}

// ============================================================================
// ApiError
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
    pub data: ErrorData,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, error: &str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
            data: ErrorData {
                error: error.to_string(),
                reauth_required: false,
                device_token: None,
            },
        }
    }

    pub fn missing_auth() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            error_codes::MISSING_AUTH,
            "MISSING_AUTH",
            "Missing Authorization header",
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            "INVALID_PAYLOAD",
            msg,
        )
    }

    pub fn timeout(after_secs: u64) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            error_codes::TIMEOUT,
            "REQUEST_TIMEOUT",
            format!("Request did not complete within {}s", after_secs),
        )
    }

    fn status_from(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let code = match &e {
            AuthError::UserNotFound => error_codes::NOT_FOUND,
            AuthError::UserNotAuthorized => error_codes::PERMISSION_DENIED,
            AuthError::DevicePendingApproval { .. } => error_codes::DEVICE_PENDING_APPROVAL,
            AuthError::InvalidCredentials(_) | AuthError::InvalidToken => error_codes::AUTH_FAILED,
            AuthError::SessionExpired => error_codes::SESSION_EXPIRED,
            AuthError::Upstream(_) => error_codes::UPSTREAM_ERROR,
            AuthError::SessionStore(_) => error_codes::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => error_codes::INTERNAL_ERROR,
        };
        let mut err = Self::new(Self::status_from(e.http_status()), code, e.code(), e.to_string());
        if let AuthError::DevicePendingApproval { device_token } = e {
            err.data.device_token = Some(device_token);
        }
        err
    }
}

impl From<TransactionError> for ApiError {
    fn from(e: TransactionError) -> Self {
        let code = match &e {
            TransactionError::InvalidPayload(_) => error_codes::INVALID_PARAMETER,
            TransactionError::SessionInstability { .. } => error_codes::REAUTH_REQUIRED,
            TransactionError::PermissionDenied(_) => error_codes::PERMISSION_DENIED,
            TransactionError::OriginNotFound { .. } => error_codes::NOT_FOUND,
            TransactionError::ConflictingDestination { .. } => error_codes::CONFLICT,
            TransactionError::OrchestrationTimeout { .. } => error_codes::TIMEOUT,
            TransactionError::CredentialUnavailable(_) => error_codes::SERVICE_UNAVAILABLE,
            TransactionError::ExternalHardError { .. } | TransactionError::Transport(_) => {
                error_codes::UPSTREAM_ERROR
            }
            TransactionError::Internal(_) => error_codes::INTERNAL_ERROR,
        };
        let mut err = Self::new(Self::status_from(e.http_status()), code, e.code(), e.to_string());
        err.data.reauth_required = e.reauth_required();
        err
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %self.data.error, msg = %self.msg, "Request failed");
        } else {
            warn!(status = self.status.as_u16(), error = %self.data.error, msg = %self.msg, "Request rejected");
        }
        let body = ApiResponse {
            code: self.code,
            msg: self.msg,
            data: Some(self.data),
        };
        (self.status, Json(body)).into_response()
    }
}
