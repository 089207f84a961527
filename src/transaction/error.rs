//! Transaction Error Types
//!
//! Every failure a transaction can end in. Codes are stable strings used in
//! API responses.

use thiserror::Error;

use crate::erp::ErpError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    // === Authorization ===
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // === Business data ===
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Location {warehouse}/{address} not found in stock")]
    OriginNotFound { warehouse: i64, address: String },

    #[error("Destination holds a different product ({product_code})")]
    ConflictingDestination { product_code: i64 },

    // === Orchestration ===
    #[error("Batch {batch_id} lines not visible in time; batch left unfinalized")]
    OrchestrationTimeout { batch_id: String },

    // === ERP ===
    #[error("ERP credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("ERP session unstable, reauthentication required: {message}")]
    SessionInstability { message: String },

    #[error("ERP rejected {service}: {message}")]
    ExternalHardError { service: String, message: String },

    #[error("ERP unreachable: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactionError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransactionError::PermissionDenied(_) => "PERMISSION_DENIED",
            TransactionError::InvalidPayload(_) => "INVALID_PAYLOAD",
            TransactionError::OriginNotFound { .. } => "ORIGIN_NOT_FOUND",
            TransactionError::ConflictingDestination { .. } => "CONFLICTING_DESTINATION",
            TransactionError::OrchestrationTimeout { .. } => "ORCHESTRATION_TIMEOUT",
            TransactionError::CredentialUnavailable(_) => "CREDENTIAL_UNAVAILABLE",
            TransactionError::SessionInstability { .. } => "SESSION_INSTABILITY",
            TransactionError::ExternalHardError { .. } => "EXTERNAL_HARD_ERROR",
            TransactionError::Transport(_) => "TRANSPORT_ERROR",
            TransactionError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransactionError::InvalidPayload(_) => 400,
            TransactionError::SessionInstability { .. } => 401,
            TransactionError::PermissionDenied(_) => 403,
            TransactionError::OriginNotFound { .. } => 404,
            TransactionError::ConflictingDestination { .. } => 409,
            TransactionError::Internal(_) => 500,
            TransactionError::ExternalHardError { .. } | TransactionError::Transport(_) => 502,
            TransactionError::CredentialUnavailable(_) => 503,
            TransactionError::OrchestrationTimeout { .. } => 504,
        }
    }

    /// The operator must log in again to get a fresh ERP session
    pub fn reauth_required(&self) -> bool {
        matches!(self, TransactionError::SessionInstability { .. })
    }
}

impl From<ErpError> for TransactionError {
    fn from(e: ErpError) -> Self {
        match e {
            ErpError::CredentialUnavailable(m) => TransactionError::CredentialUnavailable(m),
            ErpError::SessionInstability { message, .. } => {
                TransactionError::SessionInstability { message }
            }
            ErpError::HardError { service, message } => {
                TransactionError::ExternalHardError { service, message }
            }
            ErpError::Transport(m) | ErpError::Decode(m) => TransactionError::Transport(m),
            ErpError::Encode(m) => TransactionError::Internal(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TransactionError::PermissionDenied("transferencia".into()).code(),
            "PERMISSION_DENIED"
        );
        assert_eq!(
            TransactionError::ConflictingDestination { product_code: 7 }.code(),
            "CONFLICTING_DESTINATION"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransactionError::InvalidPayload("x".into()).http_status(), 400);
        assert_eq!(
            TransactionError::SessionInstability { message: String::new() }.http_status(),
            401
        );
        assert_eq!(
            TransactionError::OrchestrationTimeout { batch_id: "9".into() }.http_status(),
            504
        );
    }

    #[test]
    fn test_from_erp_error() {
        let err: TransactionError = ErpError::SessionInstability {
            service: "DatasetSP.save".into(),
            attempts: 3,
            message: "Sessão expirada".into(),
        }
        .into();
        assert!(err.reauth_required());
        assert_eq!(err.to_string(), "ERP session unstable, reauthentication required: Sessão expirada");

        let err: TransactionError = ErpError::HardError {
            service: "DatasetSP.save".into(),
            message: "Campo obrigatório".into(),
        }
        .into();
        assert_eq!(err.code(), "EXTERNAL_HARD_ERROR");
        assert!(!err.reauth_required());
    }
}
