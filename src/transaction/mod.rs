//! Operator transactions against the ERP
//!
//! - `orchestrator`: permission gate + dispatch
//! - `movement`: withdrawal / transfer saga (header, lines, visibility, finalize)
//! - `picking`: movement into a pick location
//! - `correction`: on-hand quantity overwrite with history
//! - `permissions`: capability lookup

pub mod correction;
pub mod error;
pub mod movement;
pub mod orchestrator;
pub mod permissions;
pub mod picking;
pub mod types;

pub use error::TransactionError;
pub use orchestrator::TransactionOrchestrator;
pub use types::{
    CorrectionPayload, Destination, LineItem, Origin, Permissions, TransactionBatch,
    TransactionKind, TransactionRequest,
};
