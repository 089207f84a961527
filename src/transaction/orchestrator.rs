//! Transaction Orchestrator
//!
//! Entry point for operator transactions: permission gate, then dispatch to
//! the saga for the requested kind.
//!
//! ```text
//! execute ──► decode payload ──► permissions (fresh read) ──► gate
//!                                                              │
//!            ┌──────────────────────┬──────────────────────────┤
//!            ▼                      ▼                          ▼
//!   baixa / transferencia        picking                   correcao
//!        movement::run        picking::plan ─► movement::run  correction::run
//! ```
//!
//! Sagas abort on the first error. Writes already issued are not rolled
//! back; the ERP has no compensating primitive for them.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::error::TransactionError;
use super::types::{Permissions, TransactionKind, TransactionRequest};
use super::{correction, movement, permissions, picking};
use crate::erp::{ConsistencyWaiter, Erp};

/// Everything a saga step needs
pub(super) struct SagaContext<'a> {
    pub erp: &'a dyn Erp,
    pub waiter: &'a ConsistencyWaiter,
    pub operator_id: i64,
    pub session: &'a str,
    pub permissions: &'a Permissions,
}

pub struct TransactionOrchestrator {
    erp: Arc<dyn Erp>,
    waiter: ConsistencyWaiter,
}

impl TransactionOrchestrator {
    pub fn new(erp: Arc<dyn Erp>, waiter: ConsistencyWaiter) -> Self {
        Self { erp, waiter }
    }

    /// Decode `payload` for `kind` and run it for `operator_id` under the
    /// operator's ERP session. Returns the operator-facing result message.
    pub async fn execute(
        &self,
        kind: TransactionKind,
        payload: Value,
        operator_id: i64,
        session_handle: &str,
    ) -> Result<String, TransactionError> {
        let request = TransactionRequest::decode(kind, payload)?;
        self.execute_request(request, operator_id, session_handle)
            .await
    }

    pub async fn execute_request(
        &self,
        request: TransactionRequest,
        operator_id: i64,
        session_handle: &str,
    ) -> Result<String, TransactionError> {
        let kind = request.kind();
        let perms = permissions::lookup(self.erp.as_ref(), operator_id).await?;
        if !perms.allows(kind) {
            warn!(cod_usu = operator_id, kind = %kind, "Permission denied");
            return Err(TransactionError::PermissionDenied(format!(
                "user {} may not run {}",
                operator_id, kind
            )));
        }

        info!(cod_usu = operator_id, kind = %kind, "Transaction started");
        let ctx = SagaContext {
            erp: self.erp.as_ref(),
            waiter: &self.waiter,
            operator_id,
            session: session_handle,
            permissions: &perms,
        };

        let result = match request {
            TransactionRequest::Withdrawal { origin, quantity } => {
                movement::run(&ctx, movement::MovementPlan::withdrawal(origin, quantity)).await
            }
            TransactionRequest::Transfer {
                origin,
                destination,
            } => {
                let plan = movement::MovementPlan::transfer(origin, destination, &perms);
                movement::run(&ctx, plan).await
            }
            TransactionRequest::Picking {
                origin,
                destination,
            } => movement::run(&ctx, picking::plan(origin, destination)).await,
            TransactionRequest::Correction(payload) => correction::run(&ctx, payload).await,
        };

        match &result {
            Ok(message) => info!(cod_usu = operator_id, kind = %kind, message = %message, "Transaction completed"),
            Err(e) => warn!(cod_usu = operator_id, kind = %kind, code = e.code(), error = %e, "Transaction failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::client::mock::MockErp;
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator(erp: Arc<MockErp>) -> TransactionOrchestrator {
        TransactionOrchestrator::new(erp, ConsistencyWaiter::new(10, Duration::from_millis(500)))
    }

    fn grant(erp: &MockErp, transf: &str, baixa: &str, pick: &str, corre: &str) {
        erp.on_query(
            "FROM AD_APPPERM p",
            json!([["1", "1 - CD", 31, transf, baixa, pick, corre, "N", "N"]]),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_gate_blocks_before_any_write() {
        let erp = Arc::new(MockErp::new());
        grant(&erp, "N", "S", "S", "S");

        let err = orchestrator(erp.clone())
            .execute(
                TransactionKind::Transfer,
                json!({
                    "origem": {"codarm": 1, "sequencia": 10},
                    "destino": {"armazemDestino": 1, "enderecoDestino": "20", "quantidade": 3}
                }),
                31,
                "JS-1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransactionError::PermissionDenied(_)));
        assert_eq!(erp.write_count(), 0);
        assert_eq!(erp.queries_matching("AD_CADEND"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_payload_skips_erp() {
        let erp = Arc::new(MockErp::new());
        grant(&erp, "S", "S", "S", "S");

        let err = orchestrator(erp.clone())
            .execute(TransactionKind::Withdrawal, json!({"quantidade": 5}), 31, "JS-1")
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_PAYLOAD");
        assert_eq!(erp.queries_matching("SELECT"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawal_end_to_end() {
        let erp = Arc::new(MockErp::new());
        grant(&erp, "N", "S", "N", "N");
        erp.on_query("SELECT CODPROD, ENDPIC FROM AD_CADEND", json!([[500, "N"]]));
        erp.on_query_seq("SELECT COUNT(*) FROM AD_IBXEND", vec![json!([[0]]), json!([[1]])]);
        erp.set_batch_id("4711");

        let message = orchestrator(erp.clone())
            .execute(
                TransactionKind::Withdrawal,
                json!({"origem": {"codarm": 1, "sequencia": 10}, "quantidade": 5}),
                31,
                "JS-1",
            )
            .await
            .unwrap();

        assert_eq!(message, movement::DEFAULT_SUCCESS_MESSAGE);

        let writes = erp.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].entity.as_deref(), Some("AD_BXAEND"));
        assert_eq!(writes[1].entity.as_deref(), Some("AD_IBXEND"));
        assert_eq!(writes[2].service, "ActionButtonsSP.executeSTP");
        assert!(writes.iter().all(|w| w.attribution == "user:JS-1"));

        let records = writes[1].body["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0]["values"],
            json!({"0": "4711", "1": "1", "2": "10", "3": "", "4": "", "5": "5.000", "6": "S"})
        );
        assert_eq!(erp.queries_matching("WHERE SEQBAI = 4711"), 2);
        assert_eq!(
            writes[2].body["stpCall"]["rows"]["row"][0]["field"][0]["$"],
            "4711"
        );
    }
}
