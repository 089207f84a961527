//! Operator sessions
//!
//! - `registry`: token → ERP session handle, sliding TTL, keep-alive schedule
//! - `keepalive`: background pings for due sessions

pub mod error;
pub mod keepalive;
pub mod redis_store;
pub mod registry;
pub mod store;

pub use error::SessionError;
pub use keepalive::{KeepAliveConfig, KeepAliveWorker, PingOutcome, TickReport};
pub use redis_store::RedisSessionStore;
pub use registry::SessionRegistry;
pub use store::{MemorySessionStore, Session, SessionStore};

/// Short suffix of an operator token, safe to log
pub fn token_tag(token: &str) -> &str {
    let start = token.len().saturating_sub(8);
    token.get(start..).unwrap_or("")
}
