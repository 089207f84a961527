//! Keep-alive worker
//!
//! The ERP drops operator sessions after a short idle window, shorter than
//! normal think-time in the app. This worker pings every due session on a
//! fixed tick so sessions stay open while the operator is still logged in.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::registry::SessionRegistry;
use super::token_tag;
use crate::erp::Erp;

#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// How often due sessions are collected
    pub tick: Duration,
    /// Per-ping timeout
    pub ping_timeout: Duration,
}

impl KeepAliveConfig {
    /// Tick at a third of the ping interval to bound how late a ping can be.
    pub fn for_ping_interval(ping_interval: Duration, ping_timeout: Duration) -> Self {
        Self {
            tick: (ping_interval / 3).max(Duration::from_millis(100)),
            ping_timeout,
        }
    }
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Ping accepted, next one scheduled
    Renewed,
    /// Ping failed or timed out, entry stays due
    Failed,
    /// Session no longer exists, entry dropped
    Dropped,
}

/// Counters for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub renewed: usize,
    pub failed: usize,
    pub dropped: usize,
    pub purged: usize,
}

pub struct KeepAliveWorker {
    registry: Arc<SessionRegistry>,
    erp: Arc<dyn Erp>,
    config: KeepAliveConfig,
}

impl KeepAliveWorker {
    pub fn new(registry: Arc<SessionRegistry>, erp: Arc<dyn Erp>, config: KeepAliveConfig) -> Self {
        Self {
            registry,
            erp,
            config,
        }
    }

    /// Run forever on a fixed tick
    pub async fn run(&self) -> ! {
        info!(
            tick_ms = self.config.tick.as_millis() as u64,
            ping_timeout_ms = self.config.ping_timeout.as_millis() as u64,
            "Starting keep-alive worker"
        );

        loop {
            tokio::time::sleep(self.config.tick).await;
            let report = self.tick().await;
            if report.due > 0 || report.purged > 0 {
                debug!(
                    due = report.due,
                    renewed = report.renewed,
                    failed = report.failed,
                    dropped = report.dropped,
                    purged = report.purged,
                    "Keep-alive tick"
                );
            }
        }
    }

    /// Ping every due session once. Pings run concurrently, each under its
    /// own timeout, so one slow session does not hold up the others.
    pub async fn tick(&self) -> TickReport {
        let now_ms = self.registry.now_ms();
        let purged = match self.registry.purge_expired_at(now_ms).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Session purge failed");
                0
            }
        };
        let due = match self.registry.due_tokens_at(now_ms).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "Could not read keep-alive schedule");
                return TickReport {
                    purged,
                    ..TickReport::default()
                };
            }
        };

        let outcomes = join_all(due.iter().map(|token| self.ping_one(token))).await;

        let mut report = TickReport {
            due: due.len(),
            purged,
            ..TickReport::default()
        };
        for outcome in outcomes {
            match outcome {
                PingOutcome::Renewed => report.renewed += 1,
                PingOutcome::Failed => report.failed += 1,
                PingOutcome::Dropped => report.dropped += 1,
            }
        }
        report
    }

    async fn ping_one(&self, token: &str) -> PingOutcome {
        let handle = match self.registry.session_handle(token).await {
            Ok(Some(handle)) => handle,
            Ok(None) => return PingOutcome::Dropped,
            Err(e) => {
                warn!(token = token_tag(token), error = %e, "Session lookup failed");
                return PingOutcome::Failed;
            }
        };

        match tokio::time::timeout(self.config.ping_timeout, self.erp.keep_alive(&handle)).await {
            Ok(Ok(true)) => match self.registry.reschedule_after_ping(token).await {
                Ok(true) => PingOutcome::Renewed,
                Ok(false) => PingOutcome::Dropped,
                Err(e) => {
                    warn!(token = token_tag(token), error = %e, "Keep-alive reschedule failed");
                    PingOutcome::Failed
                }
            },
            Ok(Ok(false)) => {
                warn!(token = token_tag(token), "Keep-alive rejected by ERP");
                self.mark_failed(token).await
            }
            Ok(Err(e)) => {
                warn!(token = token_tag(token), error = %e, "Keep-alive failed");
                self.mark_failed(token).await
            }
            Err(_) => {
                warn!(
                    token = token_tag(token),
                    timeout_ms = self.config.ping_timeout.as_millis() as u64,
                    "Keep-alive timed out"
                );
                self.mark_failed(token).await
            }
        }
    }

    async fn mark_failed(&self, token: &str) -> PingOutcome {
        if let Err(e) = self.registry.ping_failed(token).await {
            warn!(token = token_tag(token), error = %e, "Could not update keep-alive schedule");
        }
        PingOutcome::Failed
    }
}
