//! Stockgate - warehouse stock transactions over an ERP gateway
//!
//! Operators log in through the app, and each request becomes a short saga
//! of ERP reads and writes run under the operator's ERP session.
//!
//! # Modules
//!
//! - [`erp`] - ERP wire types, credential cache, retrying invoker, typed client
//! - [`session`] - operator session registry and keep-alive worker
//! - [`auth`] - JWT, operator login and device authorization
//! - [`transaction`] - permission gate and withdrawal/transfer/picking/correction sagas
//! - [`gateway`] - axum HTTP layer
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing setup

pub mod config;
pub mod logging;

pub mod erp;
pub mod session;

pub mod auth;
pub mod transaction;

pub mod gateway;

pub use config::AppConfig;
pub use erp::{Erp, ErpClient, ErpError};
pub use session::SessionRegistry;
pub use transaction::{TransactionError, TransactionKind, TransactionOrchestrator};
