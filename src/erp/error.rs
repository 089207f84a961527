//! ERP Error Types

use thiserror::Error;

/// Errors raised while talking to the external ERP.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErpError {
    /// System login (or its renewal) failed.
    #[error("ERP credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Every attempt in the retry budget hit an invalid session or a transport failure.
    #[error("ERP session unstable on {service} after {attempts} attempts: {message}")]
    SessionInstability {
        service: String,
        attempts: u32,
        message: String,
    },

    /// Non-transient rejection (malformed payload, business rule). Never retried.
    #[error("ERP rejected {service}: {message}")]
    HardError { service: String, message: String },

    /// Connection-level failure (timeout, refused, TLS).
    #[error("ERP transport error: {0}")]
    Transport(String),

    /// The ERP answered with something we could not decode.
    #[error("ERP decode error: {0}")]
    Decode(String),

    /// Request body could not be serialized.
    #[error("ERP encode error: {0}")]
    Encode(String),
}

impl ErpError {
    /// Raw external message, for diagnostics.
    pub fn external_message(&self) -> &str {
        match self {
            ErpError::CredentialUnavailable(m)
            | ErpError::Transport(m)
            | ErpError::Decode(m)
            | ErpError::Encode(m) => m,
            ErpError::SessionInstability { message, .. } | ErpError::HardError { message, .. } => {
                message
            }
        }
    }
}

impl From<reqwest::Error> for ErpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ErpError::Decode(e.to_string())
        } else {
            ErpError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ErpError {
    fn from(e: serde_json::Error) -> Self {
        ErpError::Encode(e.to_string())
    }
}
