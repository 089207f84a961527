//! Operator authentication
//!
//! - `token`: JWT issue / verify
//! - `service`: login (user, device, ERP session), logout, request authentication

pub mod error;
pub mod service;
pub mod token;

pub use error::AuthError;
pub use service::{LoginRequest, LoginResponse, OperatorAuth};
pub use token::{Claims, TokenIssuer};
