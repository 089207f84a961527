//! Picking
//!
//! Replenishes a pick location: a movement whose destination is always
//! flagged as a pick location once the lines are built.

use super::error::TransactionError;
use super::movement::MovementPlan;
use super::orchestrator::SagaContext;
use super::types::{Destination, Origin, TransactionKind};
use crate::erp::Attribution;
use crate::erp::types::{DatasetRecord, DatasetSaveBody};

pub const SUCCESS_MESSAGE: &str = "Picking realizado com sucesso!";

pub(super) const PICK_FLAG_ENTITY: &str = "CADEND";
const PICK_FLAG_FIELDS: [&str; 3] = ["CODARM", "SEQEND", "ENDPIC"];

pub(super) fn plan(origin: Origin, destination: Destination) -> MovementPlan {
    MovementPlan {
        kind: TransactionKind::Picking,
        origin,
        quantity: destination.quantity,
        destination: Some(destination),
        flag_pick_location: true,
        success_message: SUCCESS_MESSAGE,
    }
}

/// Set `ENDPIC = 'S'` on the destination location
pub(super) async fn mark_pick_location(
    ctx: &SagaContext<'_>,
    dest: &Destination,
) -> Result<(), TransactionError> {
    let record = DatasetRecord::at([(2, "S")]).with_pk([
        ("CODARM", dest.warehouse.to_string()),
        ("SEQEND", dest.address.clone()),
    ]);
    let body = DatasetSaveBody::new(PICK_FLAG_ENTITY, &PICK_FLAG_FIELDS, vec![record]);
    ctx.erp.save(&body, Attribution::User(ctx.session)).await?;
    Ok(())
}
