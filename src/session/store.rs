//! Session storage seam
//!
//! [`SessionStore`] holds two things that must change together: the session
//! record (expiring `ttl` after its last activity) and the keep-alive
//! schedule, ordered by next ping time. Timestamps are epoch milliseconds.
//!
//! - [`MemorySessionStore`]: single process, one lock over both structures
//! - [`super::redis_store::RedisSessionStore`]: shared across instances, survives restarts

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub operator_token: String,
    pub external_handle: String,
    pub created_at_ms: u64,
    pub last_activity_at_ms: u64,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create or replace a session and schedule its next ping, atomically.
    async fn insert(&self, session: &Session, ttl: Duration, next_ping_ms: u64)
    -> Result<(), SessionError>;

    /// Slide an existing session to `now_ms` and reschedule its ping.
    /// A missing or expired session loses its schedule entry and yields `None`.
    async fn refresh(
        &self,
        token: &str,
        now_ms: u64,
        ttl: Duration,
        next_ping_ms: u64,
    ) -> Result<Option<Session>, SessionError>;

    /// Live session, if any. An expired one is removed with its schedule entry.
    async fn get(&self, token: &str, now_ms: u64) -> Result<Option<Session>, SessionError>;

    /// Remove session and schedule entry. Returns whether a session existed.
    async fn remove(&self, token: &str) -> Result<bool, SessionError>;

    /// Move the ping to `at_ms` if the session still exists, else drop the
    /// schedule entry. Returns whether the session exists.
    async fn reschedule(&self, token: &str, now_ms: u64, at_ms: u64) -> Result<bool, SessionError>;

    /// Drop the schedule entry when its session is gone.
    async fn drop_if_orphaned(&self, token: &str, now_ms: u64) -> Result<(), SessionError>;

    /// Tokens with a ping due at or before `now_ms`, earliest first
    async fn due(&self, now_ms: u64) -> Result<Vec<String>, SessionError>;

    async fn count_live(&self, now_ms: u64) -> Result<usize, SessionError>;

    /// Remove every expired session. Returns how many were removed.
    async fn purge_expired(&self, now_ms: u64) -> Result<usize, SessionError>;

    async fn next_ping(&self, token: &str) -> Result<Option<u64>, SessionError>;

    async fn scheduled_count(&self) -> Result<usize, SessionError>;
}

// ============================================================================
// In-memory store
// ============================================================================

struct Entry {
    session: Session,
    expires_at_ms: u64,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Entry>,
    next_ping: HashMap<String, u64>,
    schedule: BTreeSet<(u64, String)>,
}

impl Inner {
    fn schedule(&mut self, token: &str, at_ms: u64) {
        if let Some(prev) = self.next_ping.insert(token.to_string(), at_ms) {
            self.schedule.remove(&(prev, token.to_string()));
        }
        self.schedule.insert((at_ms, token.to_string()));
    }

    fn unschedule(&mut self, token: &str) {
        if let Some(prev) = self.next_ping.remove(token) {
            self.schedule.remove(&(prev, token.to_string()));
        }
    }

    fn remove(&mut self, token: &str) -> bool {
        self.unschedule(token);
        self.sessions.remove(token).is_some()
    }

    /// Expired entries are removed on sight
    fn live(&mut self, token: &str, now_ms: u64) -> Option<&mut Entry> {
        let expired = self.sessions.get(token)?.expires_at_ms <= now_ms;
        if expired {
            self.remove(token);
            return None;
        }
        self.sessions.get_mut(token)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Inner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No operation leaves the maps half-updated across a panic point
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(
        &self,
        session: &Session,
        ttl: Duration,
        next_ping_ms: u64,
    ) -> Result<(), SessionError> {
        let mut inner = self.lock();
        let token = session.operator_token.clone();
        inner.sessions.insert(
            token.clone(),
            Entry {
                session: session.clone(),
                expires_at_ms: session.last_activity_at_ms.saturating_add(millis(ttl)),
            },
        );
        inner.schedule(&token, next_ping_ms);
        Ok(())
    }

    async fn refresh(
        &self,
        token: &str,
        now_ms: u64,
        ttl: Duration,
        next_ping_ms: u64,
    ) -> Result<Option<Session>, SessionError> {
        let mut inner = self.lock();
        let session = match inner.live(token, now_ms) {
            Some(entry) => {
                entry.session.last_activity_at_ms = now_ms;
                entry.expires_at_ms = now_ms.saturating_add(millis(ttl));
                entry.session.clone()
            }
            None => {
                inner.unschedule(token);
                return Ok(None);
            }
        };
        inner.schedule(token, next_ping_ms);
        Ok(Some(session))
    }

    async fn get(&self, token: &str, now_ms: u64) -> Result<Option<Session>, SessionError> {
        Ok(self.lock().live(token, now_ms).map(|e| e.session.clone()))
    }

    async fn remove(&self, token: &str) -> Result<bool, SessionError> {
        Ok(self.lock().remove(token))
    }

    async fn reschedule(&self, token: &str, now_ms: u64, at_ms: u64) -> Result<bool, SessionError> {
        let mut inner = self.lock();
        if inner.live(token, now_ms).is_some() {
            inner.schedule(token, at_ms);
            Ok(true)
        } else {
            inner.unschedule(token);
            Ok(false)
        }
    }

    async fn drop_if_orphaned(&self, token: &str, now_ms: u64) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.live(token, now_ms).is_none() {
            inner.unschedule(token);
        }
        Ok(())
    }

    async fn due(&self, now_ms: u64) -> Result<Vec<String>, SessionError> {
        Ok(self
            .lock()
            .schedule
            .iter()
            .take_while(|(at, _)| *at <= now_ms)
            .map(|(_, token)| token.clone())
            .collect())
    }

    async fn count_live(&self, now_ms: u64) -> Result<usize, SessionError> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|e| e.expires_at_ms > now_ms)
            .count())
    }

    async fn purge_expired(&self, now_ms: u64) -> Result<usize, SessionError> {
        let mut inner = self.lock();
        let stale: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, e)| e.expires_at_ms <= now_ms)
            .map(|(token, _)| token.clone())
            .collect();
        for token in &stale {
            inner.remove(token);
        }
        Ok(stale.len())
    }

    async fn next_ping(&self, token: &str) -> Result<Option<u64>, SessionError> {
        Ok(self.lock().next_ping.get(token).copied())
    }

    async fn scheduled_count(&self) -> Result<usize, SessionError> {
        let inner = self.lock();
        debug_assert_eq!(inner.schedule.len(), inner.next_ping.len());
        Ok(inner.schedule.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn session(token: &str, at_ms: u64) -> Session {
        Session {
            operator_token: token.to_string(),
            external_handle: format!("JS-{}", token),
            created_at_ms: at_ms,
            last_activity_at_ms: at_ms,
        }
    }

    #[tokio::test]
    async fn test_expired_entry_removed_on_get() {
        let store = MemorySessionStore::new();
        store.insert(&session("a", 1_000), TTL, 16_000).await.unwrap();

        assert!(store.get("a", 60_999).await.unwrap().is_some());
        assert_eq!(store.get("a", 61_000).await.unwrap(), None);
        assert_eq!(store.scheduled_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refresh_missing_drops_schedule() {
        let store = MemorySessionStore::new();
        store.insert(&session("a", 0), TTL, 15_000).await.unwrap();
        store.lock().sessions.remove("a");

        assert_eq!(store.refresh("a", 1_000, TTL, 16_000).await.unwrap(), None);
        assert_eq!(store.next_ping("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reschedule_moves_single_entry() {
        let store = MemorySessionStore::new();
        store.insert(&session("a", 0), TTL, 15_000).await.unwrap();

        assert!(store.reschedule("a", 15_000, 30_000).await.unwrap());
        assert_eq!(store.scheduled_count().await.unwrap(), 1);
        assert!(store.due(29_999).await.unwrap().is_empty());
        assert_eq!(store.due(30_000).await.unwrap(), vec!["a".to_string()]);
    }
}
