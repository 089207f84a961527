//! Operator session registry
//!
//! Maps operator tokens to ERP session handles with sliding expiration, and
//! keeps the keep-alive schedule next to the sessions so every mutation
//! updates both at once. Storage is a [`SessionStore`]: Redis in production,
//! memory for a single process.
//!
//! ```text
//! register ──► Active ──(validate_and_refresh)──► Active
//!                 │
//!                 ├──(ttl elapsed)──► Expired ──► absent
//!                 └──(revoke)───────► Revoked ──► absent
//! ```
//!
//! Invariant: every live session has exactly one schedule entry.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tracing::{debug, info};

use super::error::SessionError;
use super::store::{MemorySessionStore, Session, SessionStore};
use super::token_tag;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(50 * 60);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Wall-clock milliseconds advanced by the tokio clock, so paused test
/// time drives expiry and the schedule.
struct Clock {
    anchor: Instant,
    anchor_ms: u64,
}

impl Clock {
    fn new() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            anchor: Instant::now(),
            anchor_ms,
        }
    }

    fn now_ms(&self) -> u64 {
        self.anchor_ms + Instant::now().duration_since(self.anchor).as_millis() as u64
    }
}

pub struct SessionRegistry {
    ttl: Duration,
    ping_interval: Duration,
    store: Arc<dyn SessionStore>,
    clock: Clock,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_PING_INTERVAL)
    }
}

impl SessionRegistry {
    /// In-memory registry
    pub fn new(ttl: Duration, ping_interval: Duration) -> Self {
        Self::with_store(Arc::new(MemorySessionStore::new()), ttl, ping_interval)
    }

    pub fn with_store(store: Arc<dyn SessionStore>, ttl: Duration, ping_interval: Duration) -> Self {
        Self {
            ttl,
            ping_interval,
            store,
            clock: Clock::new(),
        }
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Current time on the registry clock, epoch milliseconds
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn next_ping_from(&self, now_ms: u64) -> u64 {
        now_ms + self.ping_interval.as_millis() as u64
    }

    /// Create (or replace) the session for `operator_token` and schedule its
    /// first keep-alive ping.
    pub async fn register(&self, operator_token: &str, external_handle: &str) -> Result<(), SessionError> {
        self.register_at(operator_token, external_handle, self.now_ms()).await
    }

    pub async fn register_at(
        &self,
        operator_token: &str,
        external_handle: &str,
        now_ms: u64,
    ) -> Result<(), SessionError> {
        let session = Session {
            operator_token: operator_token.to_string(),
            external_handle: external_handle.to_string(),
            created_at_ms: now_ms,
            last_activity_at_ms: now_ms,
        };
        self.store
            .insert(&session, self.ttl, self.next_ping_from(now_ms))
            .await?;
        info!(token = token_tag(operator_token), "Session registered");
        Ok(())
    }

    /// Resolve the ERP session handle and slide the expiration window.
    pub async fn validate_and_refresh(&self, operator_token: &str) -> Result<String, SessionError> {
        self.validate_and_refresh_at(operator_token, self.now_ms()).await
    }

    pub async fn validate_and_refresh_at(
        &self,
        operator_token: &str,
        now_ms: u64,
    ) -> Result<String, SessionError> {
        match self
            .store
            .refresh(operator_token, now_ms, self.ttl, self.next_ping_from(now_ms))
            .await?
        {
            Some(session) => Ok(session.external_handle),
            None => {
                debug!(token = token_tag(operator_token), "Session expired");
                Err(SessionError::Expired)
            }
        }
    }

    /// Remove the session and its schedule entry. Idempotent.
    pub async fn revoke(&self, operator_token: &str) -> Result<bool, SessionError> {
        let removed = self.store.remove(operator_token).await?;
        if removed {
            info!(token = token_tag(operator_token), "Session revoked");
        }
        Ok(removed)
    }

    /// Sessions still within their TTL
    pub async fn count_active(&self) -> Result<usize, SessionError> {
        self.count_active_at(self.now_ms()).await
    }

    pub async fn count_active_at(&self, now_ms: u64) -> Result<usize, SessionError> {
        self.store.count_live(now_ms).await
    }

    /// Tokens whose next ping is due now, earliest first
    pub async fn due_tokens(&self) -> Result<Vec<String>, SessionError> {
        self.due_tokens_at(self.now_ms()).await
    }

    pub async fn due_tokens_at(&self, now_ms: u64) -> Result<Vec<String>, SessionError> {
        self.store.due(now_ms).await
    }

    /// ERP handle for a due token without counting as operator activity.
    /// Expired or unknown sessions are dropped and yield `None`.
    pub async fn session_handle(&self, operator_token: &str) -> Result<Option<String>, SessionError> {
        self.session_handle_at(operator_token, self.now_ms()).await
    }

    pub async fn session_handle_at(
        &self,
        operator_token: &str,
        now_ms: u64,
    ) -> Result<Option<String>, SessionError> {
        Ok(self
            .store
            .get(operator_token, now_ms)
            .await?
            .map(|s| s.external_handle))
    }

    /// Successful keep-alive: push the next ping one interval out. A stale
    /// entry (session gone) is dropped instead; returns whether the session
    /// is still live.
    pub async fn reschedule_after_ping(&self, operator_token: &str) -> Result<bool, SessionError> {
        self.reschedule_after_ping_at(operator_token, self.now_ms()).await
    }

    pub async fn reschedule_after_ping_at(
        &self,
        operator_token: &str,
        now_ms: u64,
    ) -> Result<bool, SessionError> {
        self.store
            .reschedule(operator_token, now_ms, self.next_ping_from(now_ms))
            .await
    }

    /// Failed keep-alive: the entry stays due for the next tick unless the
    /// session no longer exists.
    pub async fn ping_failed(&self, operator_token: &str) -> Result<(), SessionError> {
        self.ping_failed_at(operator_token, self.now_ms()).await
    }

    pub async fn ping_failed_at(&self, operator_token: &str, now_ms: u64) -> Result<(), SessionError> {
        self.store.drop_if_orphaned(operator_token, now_ms).await
    }

    /// Drop every session whose TTL elapsed. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize, SessionError> {
        self.purge_expired_at(self.now_ms()).await
    }

    pub async fn purge_expired_at(&self, now_ms: u64) -> Result<usize, SessionError> {
        self.store.purge_expired(now_ms).await
    }

    /// Scheduled next ping for a token, epoch milliseconds
    pub async fn next_ping_at(&self, operator_token: &str) -> Result<Option<u64>, SessionError> {
        self.store.next_ping(operator_token).await
    }

    /// Entries in the keep-alive schedule
    pub async fn scheduled_count(&self) -> Result<usize, SessionError> {
        self.store.scheduled_count().await
    }
}
