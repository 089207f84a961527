//! Typed decoding of ERP query rows
//!
//! `DbExplorerSP.executeQuery` returns rows as arrays of loosely typed scalars
//! (numbers may come back as strings, missing columns as null). Every query
//! the core issues gets a struct here, decoded once at the boundary through
//! the safe getters on [`Row`].

use serde_json::Value;

/// One positional result row with default-on-missing getters.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    cells: &'a [Value],
}

impl<'a> Row<'a> {
    pub fn new(cells: &'a [Value]) -> Self {
        Self { cells }
    }

    fn cell(&self, idx: usize) -> Option<&'a Value> {
        match self.cells.get(idx) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    /// Text value; numbers are rendered, missing/null is `""`.
    pub fn string(&self, idx: usize) -> String {
        match self.cell(idx) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Integer value; numeric strings are parsed, anything else is 0.
    pub fn i64(&self, idx: usize) -> i64 {
        match self.cell(idx) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Float value; accepts `,` as decimal separator in strings.
    pub fn f64(&self, idx: usize) -> f64 {
        match self.cell(idx) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// ERP boolean flag (`"S"` = yes)
    pub fn flag(&self, idx: usize) -> bool {
        self.string(idx).eq_ignore_ascii_case("S")
    }
}

/// Decoding from a positional row
pub trait FromRow: Sized {
    fn from_row(row: Row<'_>) -> Self;
}

/// Decode every row of a query result
pub fn decode_all<T: FromRow>(rows: &[Vec<Value>]) -> Vec<T> {
    rows.iter().map(|r| T::from_row(Row::new(r))).collect()
}

/// Decode the first row, if any
pub fn decode_first<T: FromRow>(rows: &[Vec<Value>]) -> Option<T> {
    rows.first().map(|r| T::from_row(Row::new(r)))
}

// ============================================================================
// Per-query rows
// ============================================================================

/// `SELECT COUNT(*) ...`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountRow {
    pub count: i64,
}

impl FromRow for CountRow {
    fn from_row(row: Row<'_>) -> Self {
        Self { count: row.i64(0) }
    }
}

/// Origin location: `CODPROD, ENDPIC`
#[derive(Debug, Clone, PartialEq)]
pub struct OriginRow {
    pub product_code: i64,
    pub is_pick_location: bool,
}

impl FromRow for OriginRow {
    fn from_row(row: Row<'_>) -> Self {
        Self {
            product_code: row.i64(0),
            is_pick_location: row.flag(1),
        }
    }
}

/// Destination occupant: `CODPROD, QTDPRO`
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationRow {
    pub product_code: i64,
    pub quantity: f64,
}

impl DestinationRow {
    /// Product code 0 (or missing) marks an empty location.
    pub fn is_occupied(&self) -> bool {
        self.product_code != 0
    }
}

impl FromRow for DestinationRow {
    fn from_row(row: Row<'_>) -> Self {
        Self {
            product_code: row.i64(0),
            quantity: row.f64(1),
        }
    }
}

/// Location snapshot read before a quantity correction
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionSnapshot {
    pub product_code: i64,
    pub volume: String,
    pub entry_date: String,
    pub expiry_date: String,
    pub quantity: f64,
    pub brand: String,
    pub derivation: String,
}

impl FromRow for CorrectionSnapshot {
    fn from_row(row: Row<'_>) -> Self {
        Self {
            product_code: row.i64(0),
            volume: row.string(1),
            entry_date: row.string(2),
            expiry_date: row.string(3),
            quantity: row.f64(4),
            brand: row.string(5),
            derivation: row.string(6),
        }
    }
}

/// Operator capability row:
/// `LISTA_CODIGOS, LISTA_NOMES, CODUSU, TRANSF, BAIXA, PICK, CORRE, BXAPICK, CRIAPICK`
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionRow {
    pub warehouse_codes: String,
    pub warehouse_names: String,
    pub cod_usu: i64,
    pub transfer: bool,
    pub withdraw: bool,
    pub pick: bool,
    pub correct: bool,
    pub withdraw_from_pick: bool,
    pub create_pick: bool,
}

impl FromRow for PermissionRow {
    fn from_row(row: Row<'_>) -> Self {
        Self {
            warehouse_codes: row.string(0),
            warehouse_names: row.string(1),
            cod_usu: row.i64(2),
            transfer: row.flag(3),
            withdraw: row.flag(4),
            pick: row.flag(5),
            correct: row.flag(6),
            withdraw_from_pick: row.flag(7),
            create_pick: row.flag(8),
        }
    }
}

/// Operator lookup at login: `CODUSU, PERMITIDO`
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccessRow {
    pub cod_usu: i64,
    pub permitted: bool,
}

impl FromRow for UserAccessRow {
    fn from_row(row: Row<'_>) -> Self {
        Self {
            cod_usu: row.i64(0),
            permitted: row.string(1).eq_ignore_ascii_case("TRUE"),
        }
    }
}

/// Registered device: `DEVICETOKEN, CODUSU, ATIVO`
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRow {
    pub device_token: String,
    pub cod_usu: i64,
    pub active: bool,
}

impl FromRow for DeviceRow {
    fn from_row(row: Row<'_>) -> Self {
        Self {
            device_token: row.string(0),
            cod_usu: row.i64(1),
            active: row.flag(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cells(v: Value) -> Vec<Value> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_safe_getters_default_on_missing() {
        let raw = cells(json!(["12", null, 3.5]));
        let row = Row::new(&raw);
        assert_eq!(row.i64(0), 12);
        assert_eq!(row.i64(1), 0);
        assert_eq!(row.string(1), "");
        assert_eq!(row.f64(2), 3.5);
        assert_eq!(row.f64(9), 0.0);
        assert!(!row.flag(7));
    }

    #[test]
    fn test_numeric_string_variants() {
        let raw = cells(json!(["4,25", " 7 ", "10.0", 42]));
        let row = Row::new(&raw);
        assert_eq!(row.f64(0), 4.25);
        assert_eq!(row.i64(1), 7);
        assert_eq!(row.i64(2), 10);
        assert_eq!(row.string(3), "42");
    }

    #[test]
    fn test_permission_row() {
        let rows = vec![cells(json!([
            "1,2", "CD1,CD2", 31, "S", "N", "S", null, "S", "N"
        ]))];
        let perm: PermissionRow = decode_first(&rows).unwrap();
        assert_eq!(perm.cod_usu, 31);
        assert!(perm.transfer);
        assert!(!perm.withdraw);
        assert!(perm.pick);
        assert!(!perm.correct);
        assert!(perm.withdraw_from_pick);
        assert!(!perm.create_pick);
        assert_eq!(perm.warehouse_names, "CD1,CD2");
    }

    #[test]
    fn test_destination_empty() {
        let rows = vec![cells(json!(["0", "0"]))];
        let dest: DestinationRow = decode_first(&rows).unwrap();
        assert!(!dest.is_occupied());
        assert!(decode_first::<DestinationRow>(&[]).is_none());
    }

    #[test]
    fn test_user_access_row() {
        let rows = vec![cells(json!([77, "TRUE"])), cells(json!([78, "FALSE"]))];
        let users: Vec<UserAccessRow> = decode_all(&rows);
        assert!(users[0].permitted);
        assert!(!users[1].permitted);
        assert_eq!(users[1].cod_usu, 78);
    }
}
