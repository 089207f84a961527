//! Movement saga (withdrawal, transfer, picking)
//!
//! Step order is fixed:
//! 1. origin check (and destination conflict check) - reads only
//! 2. batch header (`AD_BXAEND`), yields `SEQBAI`
//! 3. lines: merge line for an occupied destination first, then the movement
//! 4. pick-location flag when requested (best-effort)
//! 5. one batched line save (`AD_IBXEND`)
//! 6. wait until every line is visible under `SEQBAI`
//! 7. finalization procedure

use tracing::{debug, info, warn};

use super::error::TransactionError;
use super::orchestrator::SagaContext;
use super::picking;
use super::types::{
    Destination, LINE_ENTITY, LINE_FIELDS, LineItem, Origin, Permissions, TransactionBatch,
    TransactionKind,
};
use crate::erp::rows::{CountRow, DestinationRow, OriginRow, decode_first};
use crate::erp::types::{
    DatasetRecord, DatasetSaveBody, ExecuteStpBody, ScriptRow, ScriptRows, StpCall,
};
use crate::erp::{Attribution, Erp, query_as, sql_text};

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Operação concluída com sucesso!";

const HEADER_ENTITY: &str = "AD_BXAEND";
const HEADER_FIELDS: [&str; 3] = ["SEQBAI", "DATGER", "USUGER"];
const FINALIZE_ACTION_ID: &str = "20";
const FINALIZE_PROCEDURE: &str = "NIC_STP_BAIXA_END";

/// What a movement saga does, resolved from the request
#[derive(Debug, Clone, PartialEq)]
pub(super) struct MovementPlan {
    pub kind: TransactionKind,
    pub origin: Origin,
    /// `None` for a withdrawal
    pub destination: Option<Destination>,
    pub quantity: f64,
    /// Flag the destination as a pick location after building the lines
    pub flag_pick_location: bool,
    pub success_message: &'static str,
}

impl MovementPlan {
    pub fn withdrawal(origin: Origin, quantity: f64) -> Self {
        Self {
            kind: TransactionKind::Withdrawal,
            origin,
            destination: None,
            quantity,
            flag_pick_location: false,
            success_message: DEFAULT_SUCCESS_MESSAGE,
        }
    }

    /// The pick-location flag is honoured only with `CRIAPICK`.
    pub fn transfer(origin: Origin, destination: Destination, perms: &Permissions) -> Self {
        let flag_pick_location = destination.create_pick && perms.can_create_pick_location;
        Self {
            kind: TransactionKind::Transfer,
            origin,
            quantity: destination.quantity,
            destination: Some(destination),
            flag_pick_location,
            success_message: DEFAULT_SUCCESS_MESSAGE,
        }
    }
}

pub(super) async fn run(ctx: &SagaContext<'_>, plan: MovementPlan) -> Result<String, TransactionError> {
    // 1. Reads: nothing is written until both locations check out
    let origin = read_origin(ctx.erp, &plan.origin).await?;
    if origin.is_pick_location && !ctx.permissions.can_withdraw_from_pick_location {
        return Err(TransactionError::PermissionDenied(
            "origin is a pick location and user lacks BXAPICK".into(),
        ));
    }

    let occupant = match &plan.destination {
        Some(dest) => {
            let occupant = read_destination(ctx.erp, dest).await?;
            if let Some(row) = &occupant {
                if row.product_code != origin.product_code {
                    return Err(TransactionError::ConflictingDestination {
                        product_code: row.product_code,
                    });
                }
            }
            occupant
        }
        None => None,
    };

    // 2. Header
    let batch_id = create_header(ctx).await?;
    let mut batch = TransactionBatch::new(batch_id, plan.kind, ctx.operator_id);
    debug!(batch_id = %batch.batch_id, kind = %plan.kind, "Batch header created");

    // 3. Lines
    let source_address = plan.origin.address.to_string();
    match &plan.destination {
        None => batch.push(LineItem::withdrawal(
            plan.origin.warehouse,
            source_address,
            plan.quantity,
        )),
        Some(dest) => {
            if let Some(row) = &occupant {
                info!(
                    batch_id = %batch.batch_id,
                    dest_address = %dest.address,
                    quantity = row.quantity,
                    "Destination holds the same product, clearing it first"
                );
                batch.push(LineItem::withdrawal(
                    dest.warehouse,
                    dest.address.clone(),
                    row.quantity,
                ));
            }
            batch.push(LineItem::movement(
                plan.origin.warehouse,
                source_address,
                (dest.warehouse, dest.address.clone()),
                plan.quantity,
            ));
        }
    }

    // 4. Pick-location flag
    if let (true, Some(dest)) = (plan.flag_pick_location, &plan.destination) {
        if let Err(e) = picking::mark_pick_location(ctx, dest).await {
            warn!(
                batch_id = %batch.batch_id,
                dest_warehouse = dest.warehouse,
                dest_address = %dest.address,
                error = %e,
                "Could not flag destination as pick location"
            );
        }
    }

    // 5. Submit lines
    submit_lines(ctx, &batch).await?;

    // 6. Visibility
    if !wait_for_lines(ctx, &batch).await? {
        warn!(
            batch_id = %batch.batch_id,
            lines = batch.lines.len(),
            "Lines not visible in time, batch left unfinalized for manual reconciliation"
        );
        return Err(TransactionError::OrchestrationTimeout {
            batch_id: batch.batch_id,
        });
    }

    // 7. Finalize
    let message = finalize(ctx, &batch.batch_id).await?;
    Ok(message.unwrap_or_else(|| plan.success_message.to_string()))
}

async fn read_origin(erp: &dyn Erp, origin: &Origin) -> Result<OriginRow, TransactionError> {
    let sql = format!(
        "SELECT CODPROD, ENDPIC FROM AD_CADEND WHERE CODARM = {} AND SEQEND = {}",
        origin.warehouse, origin.address
    );
    let rows: Vec<OriginRow> = query_as(erp, &sql).await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| TransactionError::OriginNotFound {
            warehouse: origin.warehouse,
            address: origin.address.to_string(),
        })
}

/// Current occupant of the destination; `None` when empty.
async fn read_destination(
    erp: &dyn Erp,
    dest: &Destination,
) -> Result<Option<DestinationRow>, TransactionError> {
    let sql = format!(
        "SELECT CODPROD, QTDPRO FROM AD_CADEND WHERE CODARM = {} AND SEQEND = '{}'",
        dest.warehouse,
        sql_text(&dest.address)
    );
    let rows = erp.query(&sql).await?;
    Ok(decode_first::<DestinationRow>(&rows).filter(DestinationRow::is_occupied))
}

async fn create_header(ctx: &SagaContext<'_>) -> Result<String, TransactionError> {
    let today = chrono::Local::now().format("%d/%m/%Y").to_string();
    let body = DatasetSaveBody::new(
        HEADER_ENTITY,
        &HEADER_FIELDS,
        vec![DatasetRecord::at([
            (1, today),
            (2, ctx.operator_id.to_string()),
        ])],
    );

    let reply = ctx.erp.save(&body, Attribution::User(ctx.session)).await?;
    let batch_id = reply.first_result().ok_or_else(|| TransactionError::ExternalHardError {
        service: "DatasetSP.save".into(),
        message: "header save returned no SEQBAI".into(),
    })?;

    // SEQBAI is interpolated into the visibility query
    if batch_id.parse::<i64>().is_err() {
        return Err(TransactionError::ExternalHardError {
            service: "DatasetSP.save".into(),
            message: format!("unexpected SEQBAI '{}'", batch_id),
        });
    }
    Ok(batch_id)
}

async fn submit_lines(ctx: &SagaContext<'_>, batch: &TransactionBatch) -> Result<(), TransactionError> {
    let body = DatasetSaveBody::new(LINE_ENTITY, &LINE_FIELDS, batch.records());
    debug!(batch_id = %batch.batch_id, lines = batch.lines.len(), "Submitting lines");
    ctx.erp.save(&body, Attribution::User(ctx.session)).await?;
    Ok(())
}

async fn wait_for_lines(ctx: &SagaContext<'_>, batch: &TransactionBatch) -> Result<bool, TransactionError> {
    let sql = format!(
        "SELECT COUNT(*) FROM AD_IBXEND WHERE SEQBAI = {} AND CODPROD IS NOT NULL",
        batch.batch_id
    );
    let expected = batch.lines.len() as i64;
    let erp = ctx.erp;

    let visible = ctx
        .waiter
        .wait_until_visible(|| {
            let sql = sql.as_str();
            async move {
                let rows: Vec<CountRow> = query_as(erp, sql).await?;
                Ok(rows.first().is_some_and(|r| r.count >= expected))
            }
        })
        .await?;
    Ok(visible)
}

async fn finalize(ctx: &SagaContext<'_>, batch_id: &str) -> Result<Option<String>, TransactionError> {
    let body = ExecuteStpBody {
        stp_call: StpCall {
            action_id: FINALIZE_ACTION_ID.to_string(),
            proc_name: FINALIZE_PROCEDURE.to_string(),
            root_entity: HEADER_ENTITY.to_string(),
            rows: ScriptRows {
                row: vec![ScriptRow::new([("SEQBAI", batch_id.to_string())])],
            },
        },
    };
    let reply = ctx
        .erp
        .execute_procedure(&body, Attribution::User(ctx.session))
        .await?;
    info!(batch_id, "Batch finalized");
    Ok(Some(reply.status_message).filter(|m| !m.is_empty()))
}
