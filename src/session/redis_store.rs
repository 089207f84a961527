//! Redis-backed session store
//!
//! - `session:<token>`: JSON [`Session`], expiring via `SET .. EX`
//! - `sessions:keepalive`: sorted set, member = token, score = next ping (epoch ms)
//!
//! Writes that touch both keys go through one `MULTI` pipeline.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::error::SessionError;
use super::store::{Session, SessionStore};

/// Prefix of per-session keys
pub const SESSION_KEY_PREFIX: &str = "session:";
/// Sorted set holding the keep-alive schedule
pub const KEEPALIVE_KEY: &str = "sessions:keepalive";

const SCAN_BATCH: usize = 200;

fn session_key(token: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, token)
}

/// Redis `EX` takes whole seconds and rejects zero
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn store_err(e: redis::RedisError) -> SessionError {
    SessionError::Store(e.to_string())
}

#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    /// Connect and `PING` once so a bad URL fails at startup.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let mut conn = ConnectionManager::new(client).await.map_err(store_err)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        info!("Connected to session store");
        Ok(Self { conn })
    }

    async fn load(&self, token: &str) -> Result<Option<Session>, SessionError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(session_key(token))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        raw.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| SessionError::Store(format!("corrupt session record: {}", e)))
        })
        .transpose()
    }

    async fn exists(&self, token: &str) -> Result<bool, SessionError> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS")
            .arg(session_key(token))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(n > 0)
    }

    async fn unschedule(&self, token: &str) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZREM")
            .arg(KEEPALIVE_KEY)
            .arg(token)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn schedule(&self, token: &str, at_ms: u64) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(KEEPALIVE_KEY)
            .arg(at_ms)
            .arg(token)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    fn encode(session: &Session) -> Result<String, SessionError> {
        serde_json::to_string(session).map_err(|e| SessionError::Store(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn insert(
        &self,
        session: &Session,
        ttl: Duration,
        next_ping_ms: u64,
    ) -> Result<(), SessionError> {
        let json = Self::encode(session)?;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(session_key(&session.operator_token))
            .arg(json)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .ignore()
            .cmd("ZADD")
            .arg(KEEPALIVE_KEY)
            .arg(next_ping_ms)
            .arg(&session.operator_token)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn refresh(
        &self,
        token: &str,
        now_ms: u64,
        ttl: Duration,
        next_ping_ms: u64,
    ) -> Result<Option<Session>, SessionError> {
        let Some(mut session) = self.load(token).await? else {
            self.unschedule(token).await?;
            return Ok(None);
        };
        session.last_activity_at_ms = now_ms;
        let json = Self::encode(&session)?;

        // XX: never resurrect a session revoked since the GET
        let mut conn = self.conn.clone();
        let (set, _): (Option<String>, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(session_key(token))
            .arg(json)
            .arg("XX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .cmd("ZADD")
            .arg(KEEPALIVE_KEY)
            .arg(next_ping_ms)
            .arg(token)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        if set.is_none() {
            debug!("Session vanished during refresh");
            self.unschedule(token).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn get(&self, token: &str, _now_ms: u64) -> Result<Option<Session>, SessionError> {
        let session = self.load(token).await?;
        if session.is_none() {
            self.unschedule(token).await?;
        }
        Ok(session)
    }

    async fn remove(&self, token: &str) -> Result<bool, SessionError> {
        let mut conn = self.conn.clone();
        let (deleted, _): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(session_key(token))
            .cmd("ZREM")
            .arg(KEEPALIVE_KEY)
            .arg(token)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(deleted > 0)
    }

    async fn reschedule(&self, token: &str, _now_ms: u64, at_ms: u64) -> Result<bool, SessionError> {
        if self.exists(token).await? {
            self.schedule(token, at_ms).await?;
            Ok(true)
        } else {
            self.unschedule(token).await?;
            Ok(false)
        }
    }

    async fn drop_if_orphaned(&self, token: &str, _now_ms: u64) -> Result<(), SessionError> {
        if !self.exists(token).await? {
            self.unschedule(token).await?;
        }
        Ok(())
    }

    async fn due(&self, now_ms: u64) -> Result<Vec<String>, SessionError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZRANGEBYSCORE")
            .arg(KEEPALIVE_KEY)
            .arg("-inf")
            .arg(now_ms)
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn count_live(&self, _now_ms: u64) -> Result<usize, SessionError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", SESSION_KEY_PREFIX);
        let mut cursor: u64 = 0;
        let mut count = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(store_err)?;
            count += keys.len();
            if next == 0 {
                return Ok(count);
            }
            cursor = next;
        }
    }

    /// Redis expires session keys itself; orphaned schedule entries are
    /// dropped when they come due.
    async fn purge_expired(&self, _now_ms: u64) -> Result<usize, SessionError> {
        Ok(0)
    }

    async fn next_ping(&self, token: &str) -> Result<Option<u64>, SessionError> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(KEEPALIVE_KEY)
            .arg(token)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(score.map(|s| s as u64))
    }

    async fn scheduled_count(&self) -> Result<usize, SessionError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZCARD")
            .arg(KEEPALIVE_KEY)
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }
}
