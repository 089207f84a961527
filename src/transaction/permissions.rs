//! Operator permission lookup
//!
//! Always a fresh read: a revoked capability must take effect on the very
//! next transaction.

use tracing::debug;

use super::error::TransactionError;
use super::types::Permissions;
use crate::erp::rows::PermissionRow;
use crate::erp::{Erp, query_as};

fn permissions_sql(cod_usu: i64) -> String {
    format!(
        "SELECT \
         LISTAGG(d.CODARM, ', ') WITHIN GROUP (ORDER BY d.CODARM) AS LISTA_CODIGOS, \
         LISTAGG(d.CODARM || ' - ' || a.DESARM, ', ') WITHIN GROUP (ORDER BY d.CODARM) AS LISTA_NOMES, \
         p.CODUSU, p.TRANSF, p.BAIXA, p.PICK, p.CORRE, p.BXAPICK, p.CRIAPICK \
         FROM AD_APPPERM p \
         JOIN AD_PERMEND d ON d.NUMREG = p.NUMREG \
         JOIN AD_CADARM a ON a.CODARM = d.CODARM \
         WHERE p.CODUSU = {} \
         GROUP BY p.CODUSU, p.TRANSF, p.BAIXA, p.PICK, p.CORRE, p.BXAPICK, p.CRIAPICK",
        cod_usu
    )
}

/// Read the capability set of `cod_usu`. An operator with no permission
/// record is denied.
pub async fn lookup(erp: &dyn Erp, cod_usu: i64) -> Result<Permissions, TransactionError> {
    let rows: Vec<PermissionRow> = query_as(erp, &permissions_sql(cod_usu)).await?;
    let row = rows.into_iter().next().ok_or_else(|| {
        TransactionError::PermissionDenied(format!("no permissions registered for user {}", cod_usu))
    })?;

    let perms = Permissions::from(row);
    debug!(
        cod_usu,
        transfer = perms.can_transfer,
        withdraw = perms.can_withdraw,
        pick = perms.can_pick,
        correct = perms.can_correct,
        "Permissions loaded"
    );
    Ok(perms)
}
