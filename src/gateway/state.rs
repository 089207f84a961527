use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::auth::OperatorAuth;
use crate::erp::Erp;
use crate::session::SessionRegistry;
use crate::transaction::TransactionOrchestrator;

/// Shared gateway state
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<OperatorAuth>,
    pub orchestrator: Arc<TransactionOrchestrator>,
    /// ERP client, for reads outside a transaction (permissions, health)
    pub erp: Arc<dyn Erp>,
    pub sessions: Arc<SessionRegistry>,
    /// Upper bound for one transaction request
    pub request_timeout: Duration,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        auth: Arc<OperatorAuth>,
        orchestrator: Arc<TransactionOrchestrator>,
        erp: Arc<dyn Erp>,
        sessions: Arc<SessionRegistry>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            auth,
            orchestrator,
            erp,
            sessions,
            request_timeout,
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
