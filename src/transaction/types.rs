//! Transaction domain types
//!
//! - `TransactionKind`: the four operations an operator can run
//! - `TransactionRequest`: typed payload, decoded once from the client JSON
//! - `LineItem` / `TransactionBatch`: movement lines submitted under one header
//! - `Permissions`: operator capability set

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::error::TransactionError;
use crate::erp::rows::PermissionRow;
use crate::erp::types::DatasetRecord;

// ============================================================================
// Kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum TransactionKind {
    #[serde(rename = "baixa")]
    Withdrawal,
    #[serde(rename = "transferencia")]
    Transfer,
    #[serde(rename = "picking")]
    Picking,
    #[serde(rename = "correcao")]
    Correction,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Withdrawal => "baixa",
            TransactionKind::Transfer => "transferencia",
            TransactionKind::Picking => "picking",
            TransactionKind::Correction => "correcao",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baixa" => Ok(TransactionKind::Withdrawal),
            "transferencia" => Ok(TransactionKind::Transfer),
            "picking" => Ok(TransactionKind::Picking),
            "correcao" => Ok(TransactionKind::Correction),
            other => Err(TransactionError::InvalidPayload(format!(
                "unknown transaction type '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Stock location (`CODARM` warehouse + `SEQEND` address)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Origin {
    #[serde(rename = "codarm", deserialize_with = "loose_i64")]
    pub warehouse: i64,
    #[serde(rename = "sequencia", deserialize_with = "loose_i64")]
    pub address: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Destination {
    #[serde(rename = "armazemDestino", deserialize_with = "loose_i64")]
    pub warehouse: i64,
    #[serde(rename = "enderecoDestino", deserialize_with = "loose_string")]
    pub address: String,
    #[serde(rename = "quantidade", default, deserialize_with = "loose_f64")]
    pub quantity: f64,
    #[serde(rename = "criarPick", default)]
    pub create_pick: bool,
}

#[derive(Debug, Deserialize)]
struct MovementPayload {
    origem: Option<Origin>,
    destino: Option<Destination>,
    #[serde(default, deserialize_with = "loose_f64")]
    quantidade: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CorrectionPayload {
    #[serde(rename = "codarm", deserialize_with = "loose_i64")]
    pub warehouse: i64,
    #[serde(rename = "sequencia", deserialize_with = "loose_i64")]
    pub address: i64,
    #[serde(rename = "newQuantity", deserialize_with = "loose_f64")]
    pub new_quantity: f64,
}

/// A validated transaction request
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionRequest {
    Withdrawal { origin: Origin, quantity: f64 },
    Transfer { origin: Origin, destination: Destination },
    Picking { origin: Origin, destination: Destination },
    Correction(CorrectionPayload),
}

impl TransactionRequest {
    /// Decode and validate the client payload for `kind`
    pub fn decode(kind: TransactionKind, payload: Value) -> Result<Self, TransactionError> {
        let invalid = |e: serde_json::Error| TransactionError::InvalidPayload(e.to_string());

        if kind == TransactionKind::Correction {
            let p: CorrectionPayload = serde_json::from_value(payload).map_err(invalid)?;
            if !p.new_quantity.is_finite() || p.new_quantity < 0.0 {
                return Err(TransactionError::InvalidPayload(
                    "newQuantity must be zero or positive".into(),
                ));
            }
            return Ok(TransactionRequest::Correction(p));
        }

        let p: MovementPayload = serde_json::from_value(payload).map_err(invalid)?;
        let origin = p
            .origem
            .ok_or_else(|| TransactionError::InvalidPayload("origem missing".into()))?;

        match kind {
            TransactionKind::Withdrawal => {
                check_quantity(p.quantidade)?;
                Ok(TransactionRequest::Withdrawal {
                    origin,
                    quantity: p.quantidade,
                })
            }
            _ => {
                let destination = p
                    .destino
                    .ok_or_else(|| TransactionError::InvalidPayload("destino missing".into()))?;
                check_quantity(destination.quantity)?;
                if destination.address.is_empty() {
                    return Err(TransactionError::InvalidPayload(
                        "enderecoDestino missing".into(),
                    ));
                }
                if destination.warehouse == origin.warehouse
                    && destination.address.trim() == origin.address.to_string()
                {
                    return Err(TransactionError::InvalidPayload(
                        "destination is the origin location".into(),
                    ));
                }
                if kind == TransactionKind::Picking {
                    Ok(TransactionRequest::Picking {
                        origin,
                        destination,
                    })
                } else {
                    Ok(TransactionRequest::Transfer {
                        origin,
                        destination,
                    })
                }
            }
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionRequest::Withdrawal { .. } => TransactionKind::Withdrawal,
            TransactionRequest::Transfer { .. } => TransactionKind::Transfer,
            TransactionRequest::Picking { .. } => TransactionKind::Picking,
            TransactionRequest::Correction(_) => TransactionKind::Correction,
        }
    }
}

fn check_quantity(q: f64) -> Result<(), TransactionError> {
    if q.is_finite() && q > 0.0 {
        Ok(())
    } else {
        Err(TransactionError::InvalidPayload(
            "quantidade must be positive".into(),
        ))
    }
}

// Clients send numbers as JSON numbers or numeric strings.

fn loose_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| serde::de::Error::custom("expected integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected integer, got '{}'", s))),
        other => Err(serde::de::Error::custom(format!(
            "expected integer, got {}",
            other
        ))),
    }
}

fn loose_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("expected number")),
        Value::String(s) => s
            .trim()
            .replace(',', ".")
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected number, got '{}'", s))),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!(
            "expected number, got {}",
            other
        ))),
    }
}

fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

// ============================================================================
// Batch
// ============================================================================

/// Line entity and its field order
pub const LINE_ENTITY: &str = "AD_IBXEND";
pub const LINE_FIELDS: [&str; 7] = ["SEQBAI", "CODARM", "SEQEND", "ARMDES", "ENDDES", "QTDPRO", "APP"];

/// One movement line. No destination means stock leaves the location.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub source_warehouse: i64,
    pub source_address: String,
    pub destination: Option<(i64, String)>,
    pub quantity: f64,
    pub applied: bool,
}

impl LineItem {
    pub fn withdrawal(warehouse: i64, address: impl Into<String>, quantity: f64) -> Self {
        Self {
            source_warehouse: warehouse,
            source_address: address.into(),
            destination: None,
            quantity,
            applied: true,
        }
    }

    pub fn movement(
        warehouse: i64,
        address: impl Into<String>,
        destination: (i64, String),
        quantity: f64,
    ) -> Self {
        Self {
            source_warehouse: warehouse,
            source_address: address.into(),
            destination: Some(destination),
            quantity,
            applied: true,
        }
    }

    /// Positional record under `LINE_FIELDS`
    pub fn to_record(&self, batch_id: &str) -> DatasetRecord {
        let (dest_warehouse, dest_address) = match &self.destination {
            Some((w, a)) => (w.to_string(), a.clone()),
            None => (String::new(), String::new()),
        };
        DatasetRecord::positional([
            batch_id.to_string(),
            self.source_warehouse.to_string(),
            self.source_address.clone(),
            dest_warehouse,
            dest_address,
            format!("{:.3}", self.quantity),
            if self.applied { "S" } else { "N" }.to_string(),
        ])
    }
}

/// Lines grouped under one ERP header (`SEQBAI`)
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionBatch {
    pub batch_id: String,
    pub kind: TransactionKind,
    pub operator_id: i64,
    pub lines: Vec<LineItem>,
}

impl TransactionBatch {
    pub fn new(batch_id: String, kind: TransactionKind, operator_id: i64) -> Self {
        Self {
            batch_id,
            kind,
            operator_id,
            lines: Vec::new(),
        }
    }

    pub fn push(&mut self, line: LineItem) {
        self.lines.push(line);
    }

    pub fn records(&self) -> Vec<DatasetRecord> {
        self.lines
            .iter()
            .map(|l| l.to_record(&self.batch_id))
            .collect()
    }
}

// ============================================================================
// Permissions
// ============================================================================

/// Operator capabilities, re-read for every transaction
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Permissions {
    #[serde(rename = "CODUSU")]
    pub cod_usu: i64,
    /// Warehouse codes the operator may work in
    #[serde(rename = "LISTA_CODIGOS")]
    pub warehouse_codes: String,
    /// `code - name` pairs for the same warehouses
    #[serde(rename = "LISTA_NOMES")]
    pub warehouse_names: String,
    #[serde(rename = "TRANSF")]
    pub can_transfer: bool,
    #[serde(rename = "BAIXA")]
    pub can_withdraw: bool,
    #[serde(rename = "PICK")]
    pub can_pick: bool,
    #[serde(rename = "CORRE")]
    pub can_correct: bool,
    #[serde(rename = "BXAPICK")]
    pub can_withdraw_from_pick_location: bool,
    #[serde(rename = "CRIAPICK")]
    pub can_create_pick_location: bool,
}

impl Permissions {
    pub fn allows(&self, kind: TransactionKind) -> bool {
        match kind {
            TransactionKind::Withdrawal => self.can_withdraw,
            TransactionKind::Transfer => self.can_transfer,
            TransactionKind::Picking => self.can_pick,
            TransactionKind::Correction => self.can_correct,
        }
    }
}

impl From<PermissionRow> for Permissions {
    fn from(row: PermissionRow) -> Self {
        Self {
            cod_usu: row.cod_usu,
            warehouse_codes: row.warehouse_codes,
            warehouse_names: row.warehouse_names,
            can_transfer: row.transfer,
            can_withdraw: row.withdraw,
            can_pick: row.pick,
            can_correct: row.correct,
            can_withdraw_from_pick_location: row.withdraw_from_pick,
            can_create_pick_location: row.create_pick,
        }
    }
}
