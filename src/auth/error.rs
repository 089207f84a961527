//! Auth Error Types

use thiserror::Error;

use crate::erp::ErpError;
use crate::session::SessionError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("User does not exist or name is wrong")]
    UserNotFound,

    #[error("User has no app access (AD_APPPERM)")]
    UserNotAuthorized,

    /// The device is unknown or not yet approved by an administrator.
    #[error("Device not authorized, ask an administrator to approve it")]
    DevicePendingApproval { device_token: String },

    #[error("ERP rejected the credentials: {0}")]
    InvalidCredentials(String),

    #[error("Missing or invalid token")]
    InvalidToken,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session store unavailable: {0}")]
    SessionStore(String),

    #[error("ERP unavailable: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::UserNotAuthorized => "USER_NOT_AUTHORIZED",
            AuthError::DevicePendingApproval { .. } => "DEVICE_PENDING_APPROVAL",
            AuthError::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::SessionStore(_) => "SESSION_STORE_UNAVAILABLE",
            AuthError::Upstream(_) => "UPSTREAM_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::UserNotFound => 404,
            AuthError::UserNotAuthorized | AuthError::DevicePendingApproval { .. } => 403,
            AuthError::InvalidCredentials(_)
            | AuthError::InvalidToken
            | AuthError::SessionExpired => 401,
            AuthError::Upstream(_) => 502,
            AuthError::SessionStore(_) => 503,
            AuthError::Internal(_) => 500,
        }
    }
}

impl From<ErpError> for AuthError {
    fn from(e: ErpError) -> Self {
        AuthError::Upstream(e.to_string())
    }
}

impl From<SessionError> for AuthError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Expired => AuthError::SessionExpired,
            SessionError::Store(m) => AuthError::SessionStore(m),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status() {
        assert_eq!(AuthError::UserNotFound.http_status(), 404);
        assert_eq!(
            AuthError::DevicePendingApproval { device_token: "d".into() }.http_status(),
            403
        );
        assert_eq!(AuthError::InvalidToken.http_status(), 401);
        assert_eq!(AuthError::Upstream("x".into()).code(), "UPSTREAM_ERROR");
        assert_eq!(
            AuthError::from(SessionError::Store("refused".into())).http_status(),
            503
        );
        assert_eq!(AuthError::from(SessionError::Expired), AuthError::SessionExpired);
    }
}
