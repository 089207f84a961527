//! External ERP integration
//!
//! Layers, bottom-up:
//! - `http`: raw exchanges (`ErpTransport`, reqwest implementation)
//! - `credential`: cached system bearer token with expiry-driven renewal
//! - `invoker`: bounded retry with tri-state reply classification
//! - `client`: typed operations (`Erp` trait) used by the rest of the crate
//! - `consistency`: read-after-write visibility polling
//! - `types` / `rows`: wire shapes and typed row decoding

pub mod client;
pub mod consistency;
pub mod credential;
pub mod error;
pub mod http;
pub mod invoker;
pub mod rows;
pub mod types;

pub use client::{Erp, ErpClient, query_as, sql_text};
pub use consistency::ConsistencyWaiter;
pub use credential::{CredentialCache, CredentialStatus};
pub use error::ErpError;
pub use http::{CallAuth, ErpTransport, HttpTransport};
pub use invoker::{Attribution, ReplyStatus, ResilientInvoker, RetryPolicy};
