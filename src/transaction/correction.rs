//! Quantity correction
//!
//! Overwrites the on-hand quantity of one location through the ERP's
//! correction action, then records the change in `AD_HISTENDAPP`. The
//! history write runs under the system credential and cannot fail the
//! correction: by then the quantity is already changed.

use tracing::{info, warn};

use super::error::TransactionError;
use super::orchestrator::SagaContext;
use super::types::CorrectionPayload;
use crate::erp::rows::CorrectionSnapshot;
use crate::erp::types::{
    ClientEventList, DatasetRecord, DatasetSaveBody, ExecuteScriptBody, RunScript, ScriptParam,
    ScriptParams, ScriptRow, ScriptRows,
};
use crate::erp::{Attribution, query_as};

pub const SUCCESS_MESSAGE: &str = "Correção executada com sucesso!";

const CORRECTION_ACTION_ID: &str = "97";
const HISTORY_ENTITY: &str = "AD_HISTENDAPP";
const HISTORY_FIELDS: [&str; 9] = [
    "CODARM", "SEQEND", "CODPROD", "CODVOL", "MARCA", "DERIV", "QUANT", "QATUAL", "CODUSU",
];

pub(super) async fn run(
    ctx: &SagaContext<'_>,
    payload: CorrectionPayload,
) -> Result<String, TransactionError> {
    let snapshot = read_snapshot(ctx, &payload).await?;

    let script = correction_script(&payload, &snapshot);
    ctx.erp
        .execute_script(&script, Attribution::User(ctx.session))
        .await?;
    info!(
        cod_usu = ctx.operator_id,
        warehouse = payload.warehouse,
        address = payload.address,
        previous = snapshot.quantity,
        new = payload.new_quantity,
        "Quantity corrected"
    );

    let history = history_record(ctx.operator_id, &payload, &snapshot);
    match ctx.erp.save(&history, Attribution::System).await {
        Ok(_) => Ok(SUCCESS_MESSAGE.to_string()),
        Err(e) => {
            warn!(
                warehouse = payload.warehouse,
                address = payload.address,
                error = %e,
                "Correction history not recorded"
            );
            Ok(format!("Correção executada, mas erro no histórico: {}", e))
        }
    }
}

async fn read_snapshot(
    ctx: &SagaContext<'_>,
    payload: &CorrectionPayload,
) -> Result<CorrectionSnapshot, TransactionError> {
    let sql = format!(
        "SELECT DEND.CODPROD, DEND.CODVOL, \
         TO_CHAR(DEND.DATENT, 'DD/MM/YYYY') AS DATENT, \
         TO_CHAR(DEND.DATVAL, 'DD/MM/YYYY') AS DATVAL, \
         DEND.QTDPRO, PRO.MARCA, \
         (SELECT MAX(V.DESCRDANFE) FROM TGFVOA V WHERE V.CODPROD = DEND.CODPROD AND V.CODVOL = DEND.CODVOL) AS DERIVACAO \
         FROM AD_CADEND DEND \
         JOIN TGFPRO PRO ON DEND.CODPROD = PRO.CODPROD \
         WHERE DEND.CODARM = {} AND DEND.SEQEND = {}",
        payload.warehouse, payload.address
    );
    let rows: Vec<CorrectionSnapshot> = query_as(ctx.erp, &sql).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| TransactionError::OriginNotFound {
            warehouse: payload.warehouse,
            address: payload.address.to_string(),
        })
}

fn correction_script(payload: &CorrectionPayload, snapshot: &CorrectionSnapshot) -> ExecuteScriptBody {
    ExecuteScriptBody {
        run_script: RunScript {
            action_id: CORRECTION_ACTION_ID.to_string(),
            refresh_type: "SEL".to_string(),
            params: ScriptParams {
                param: vec![
                    ScriptParam::string("CODPROD", snapshot.product_code.to_string()),
                    ScriptParam::string("CODVOL", snapshot.volume.clone()),
                    ScriptParam::float("QTDPRO", payload.new_quantity),
                    ScriptParam::date("DATENT", snapshot.entry_date.clone()),
                    ScriptParam::date("DATVAL", snapshot.expiry_date.clone()),
                ],
            },
            rows: ScriptRows {
                row: vec![ScriptRow::new([
                    ("CODARM", payload.warehouse.to_string()),
                    ("SEQEND", payload.address.to_string()),
                ])],
            },
        },
        client_event_list: ClientEventList::confirm(),
    }
}

fn history_record(
    operator_id: i64,
    payload: &CorrectionPayload,
    snapshot: &CorrectionSnapshot,
) -> DatasetSaveBody {
    DatasetSaveBody::new(
        HISTORY_ENTITY,
        &HISTORY_FIELDS,
        vec![DatasetRecord::positional([
            payload.warehouse.to_string(),
            payload.address.to_string(),
            snapshot.product_code.to_string(),
            snapshot.volume.clone(),
            snapshot.brand.clone(),
            snapshot.derivation.clone(),
            format!("{:.0}", snapshot.quantity),
            format!("{:.0}", payload.new_quantity),
            operator_id.to_string(),
        ])],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::client::mock::MockErp;
    use crate::erp::{ConsistencyWaiter, ErpError};
    use crate::transaction::types::Permissions;
    use serde_json::json;

    fn payload() -> CorrectionPayload {
        CorrectionPayload {
            warehouse: 1,
            address: 10,
            new_quantity: 42.0,
        }
    }

    fn seed_snapshot(erp: &MockErp) {
        erp.on_query(
            "FROM AD_CADEND DEND",
            json!([[500, "CX", "01/02/2026", "01/02/2027", 40, "ACME", "CAIXA 12UN"]]),
        );
    }

    async fn run_correction(erp: &MockErp) -> Result<String, TransactionError> {
        let waiter = ConsistencyWaiter::default();
        let permissions = Permissions {
            cod_usu: 31,
            warehouse_codes: "1".into(),
            warehouse_names: "1 - CD".into(),
            can_transfer: false,
            can_withdraw: false,
            can_pick: false,
            can_correct: true,
            can_withdraw_from_pick_location: false,
            can_create_pick_location: false,
        };
        let ctx = SagaContext {
            erp,
            waiter: &waiter,
            operator_id: 31,
            session: "JS-C",
            permissions: &permissions,
        };
        run(&ctx, payload()).await
    }

    #[tokio::test]
    async fn test_correction_success() {
        let erp = MockErp::new();
        seed_snapshot(&erp);

        assert_eq!(run_correction(&erp).await.unwrap(), SUCCESS_MESSAGE);

        let script = &erp.writes_to("ActionButtonsSP.executeScript")[0];
        assert_eq!(script.attribution, "user:JS-C");
        let run_script = &script.body["runScript"];
        assert_eq!(run_script["actionID"], "97");
        assert_eq!(run_script["params"]["param"][2], json!({"type": "F", "paramName": "QTDPRO", "$": 42.0}));
        assert_eq!(run_script["params"]["param"][3]["$"], "01/02/2026");
        assert_eq!(run_script["rows"]["row"][0]["field"][1], json!({"fieldName": "SEQEND", "$": "10"}));
        assert_eq!(
            script.body["clientEventList"]["clientEvent"][0]["$"],
            "br.com.sankhya.actionbutton.clientconfirm"
        );

        let history = &erp.saves_for(HISTORY_ENTITY)[0];
        assert_eq!(history.attribution, "system");
        assert_eq!(history.body["records"][0]["values"]["6"], "40");
        assert_eq!(history.body["records"][0]["values"]["7"], "42");
        assert_eq!(history.body["records"][0]["values"]["8"], "31");
    }

    #[tokio::test]
    async fn test_history_failure_still_succeeds() {
        let erp = MockErp::new();
        seed_snapshot(&erp);
        erp.fail_save(
            HISTORY_ENTITY,
            ErpError::HardError {
                service: "DatasetSP.save".into(),
                message: "ORA-00001".into(),
            },
        );

        let message = run_correction(&erp).await.unwrap();
        assert!(message.starts_with("Correção executada, mas erro no histórico:"));
        assert!(message.contains("ORA-00001"));
    }

    #[tokio::test]
    async fn test_script_failure_aborts() {
        let erp = MockErp::new();
        seed_snapshot(&erp);
        erp.set_fail_script(ErpError::SessionInstability {
            service: "ActionButtonsSP.executeScript".into(),
            attempts: 3,
            message: "Sessão expirada".into(),
        });

        let err = run_correction(&erp).await.unwrap_err();
        assert!(err.reauth_required());
        assert!(erp.saves_for(HISTORY_ENTITY).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let erp = MockErp::new();
        let err = run_correction(&erp).await.unwrap_err();
        assert_eq!(err.code(), "ORIGIN_NOT_FOUND");
        assert_eq!(erp.write_count(), 0);
    }
}
