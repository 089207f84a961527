//! System credential cache
//!
//! Holds the one bearer token the backend uses for system-attributed ERP
//! calls. Readers share a read lock; renewal takes the write lock for the
//! whole login exchange so concurrent callers wait for a single login
//! instead of issuing their own.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

use super::error::ErpError;
use super::http::ErpTransport;

#[derive(Debug, Clone)]
struct Credential {
    token: String,
    expires_at: Instant,
}

impl Credential {
    fn usable(&self, now: Instant, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Snapshot for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid { expires_in: Duration },
    Expired,
    Missing,
}

pub struct CredentialCache {
    transport: Arc<dyn ErpTransport>,
    ttl: Duration,
    safety_margin: Duration,
    state: RwLock<Option<Credential>>,
}

impl CredentialCache {
    /// `ttl` is counted from issuance; the ERP does not tell us its real expiry.
    pub fn new(transport: Arc<dyn ErpTransport>, ttl: Duration, safety_margin: Duration) -> Self {
        Self {
            transport,
            ttl,
            safety_margin,
            state: RwLock::new(None),
        }
    }

    /// Current token, renewing it first when it is within the safety margin
    /// of expiry.
    pub async fn get(&self) -> Result<String, ErpError> {
        {
            let guard = self.state.read().await;
            if let Some(cred) = guard.as_ref() {
                if cred.usable(Instant::now(), self.safety_margin) {
                    return Ok(cred.token.clone());
                }
            }
        }

        let mut guard = self.state.write().await;
        // Another caller may have renewed while we waited for the lock
        if let Some(cred) = guard.as_ref() {
            if cred.usable(Instant::now(), self.safety_margin) {
                return Ok(cred.token.clone());
            }
        }
        self.login_locked(&mut guard).await
    }

    /// Unconditional renewal. Used at startup, where failure is fatal.
    pub async fn refresh(&self) -> Result<(), ErpError> {
        let mut guard = self.state.write().await;
        self.login_locked(&mut guard).await.map(|_| ())
    }

    /// Drop the cached token so the next `get` logs in again.
    pub async fn invalidate(&self) {
        let mut guard = self.state.write().await;
        if guard.take().is_some() {
            info!("System credential invalidated");
        }
    }

    /// Drop the cached token only if it is still the one the ERP rejected.
    /// A token already renewed by a concurrent caller is kept.
    pub async fn invalidate_token(&self, rejected: &str) {
        let mut guard = self.state.write().await;
        if guard.as_ref().is_some_and(|c| c.token == rejected) {
            guard.take();
            info!("System credential invalidated after rejection");
        }
    }

    pub async fn status(&self) -> CredentialStatus {
        let guard = self.state.read().await;
        match guard.as_ref() {
            None => CredentialStatus::Missing,
            Some(cred) => {
                let now = Instant::now();
                if cred.expires_at > now {
                    CredentialStatus::Valid {
                        expires_in: cred.expires_at - now,
                    }
                } else {
                    CredentialStatus::Expired
                }
            }
        }
    }

    async fn login_locked(&self, slot: &mut Option<Credential>) -> Result<String, ErpError> {
        match self.transport.login().await {
            Ok(token) => {
                *slot = Some(Credential {
                    token: token.clone(),
                    expires_at: Instant::now() + self.ttl,
                });
                info!(ttl_secs = self.ttl.as_secs(), "System credential renewed");
                Ok(token)
            }
            Err(e) => {
                *slot = None;
                warn!(error = %e, "System login failed");
                Err(match e {
                    ErpError::CredentialUnavailable(_) => e,
                    other => ErpError::CredentialUnavailable(other.to_string()),
                })
            }
        }
    }
}
