//! Session Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Unknown token, explicit logout, or TTL elapsed without activity
    #[error("Session expired or not found")]
    Expired,

    /// The backing session store could not be reached
    #[error("Session store unavailable: {0}")]
    Store(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Expired => "SESSION_EXPIRED",
            SessionError::Store(_) => "SESSION_STORE_UNAVAILABLE",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            SessionError::Expired => 401,
            SessionError::Store(_) => 503,
        }
    }
}
