//! Read-after-write visibility polling
//!
//! The ERP acknowledges batched writes before they are readable. Callers poll
//! a read predicate here before running any step that depends on the writes.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::ErpError;

pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyWaiter {
    max_attempts: u32,
    interval: Duration,
}

impl Default for ConsistencyWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL)
    }
}

impl ConsistencyWaiter {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Worst-case time spent in `wait_until_visible`, excluding check latency
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }

    /// Poll `check` every `interval`, up to `max_attempts` times.
    ///
    /// Returns `Ok(true)` on the first satisfied check and `Ok(false)` once the
    /// budget is spent. A check error counts as a miss, except a credential
    /// failure, which is returned. Dropping the future stops polling.
    pub async fn wait_until_visible<F, Fut>(&self, mut check: F) -> Result<bool, ErpError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ErpError>>,
    {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;
            match check().await {
                Ok(true) => {
                    debug!(attempt, "Writes visible");
                    return Ok(true);
                }
                Ok(false) => debug!(attempt, max_attempts = self.max_attempts, "Writes not yet visible"),
                Err(e @ ErpError::CredentialUnavailable(_)) => return Err(e),
                Err(e) => warn!(attempt, error = %e, "Visibility check failed"),
            }
        }
        Ok(false)
    }
}
