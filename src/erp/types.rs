//! ERP wire types
//!
//! Request and response shapes of the ERP service gateway. Field names and
//! nesting are the vendor's contract; do not rename them.
//!
//! - `ServiceReply`: common envelope returned by every `service.sbr` call
//! - `DatasetSaveBody`: record save (`DatasetSP.save`)
//! - `ExecuteScriptBody`: scripted action (`ActionButtonsSP.executeScript`)
//! - `ExecuteStpBody`: stored procedure (`ActionButtonsSP.executeSTP`)

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::error::ErpError;

/// Service names understood by the ERP gateway
pub mod services {
    pub const EXECUTE_QUERY: &str = "DbExplorerSP.executeQuery";
    pub const DATASET_SAVE: &str = "DatasetSP.save";
    pub const EXECUTE_SCRIPT: &str = "ActionButtonsSP.executeScript";
    pub const EXECUTE_STP: &str = "ActionButtonsSP.executeSTP";
    pub const MOBILE_LOGIN: &str = "MobileLoginSP.login";
}

// ============================================================================
// Envelopes
// ============================================================================

/// Body for bearer-authenticated calls: `{"serviceName": .., "requestBody": ..}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemServiceRequest<'a> {
    pub service_name: &'a str,
    pub request_body: &'a Value,
}

/// Body for session-cookie calls: `{"requestBody": ..}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserServiceRequest<'a> {
    pub request_body: &'a Value,
}

/// Reply envelope shared by every service call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReply {
    #[serde(default, deserialize_with = "loose_string")]
    pub service_name: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub status: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub status_message: String,
    #[serde(default)]
    pub response_body: Value,
}

impl ServiceReply {
    /// Build a reply by hand (used by transports that synthesize replies and by tests)
    pub fn new(status: &str, status_message: &str, response_body: Value) -> Self {
        Self {
            service_name: String::new(),
            status: status.to_string(),
            status_message: status_message.to_string(),
            response_body,
        }
    }

    /// Rows of a `DbExplorerSP.executeQuery` reply. Missing rows decode as empty.
    pub fn rows(&self) -> Result<Vec<Vec<Value>>, ErpError> {
        match self.response_body.get("rows") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(rows) => serde_json::from_value(rows.clone())
                .map_err(|e| ErpError::Decode(format!("query rows: {}", e))),
        }
    }

    /// First cell of `responseBody.result`, which `DatasetSP.save` uses to
    /// return generated primary keys.
    pub fn first_result(&self) -> Option<String> {
        let cell = self
            .response_body
            .get("result")?
            .as_array()?
            .first()?
            .as_array()?
            .first()?;
        match cell {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// `responseBody.jsessionid.$` of a `MobileLoginSP.login` reply
    pub fn jsessionid(&self) -> Option<String> {
        self.response_body
            .get("jsessionid")?
            .get("$")?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Accept strings, numbers and null for fields the ERP types inconsistently.
fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Reply of the system login exchange (`POST {api_url}/login`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReply {
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default)]
    pub error: Value,
}

/// Reply of the session keep-alive endpoint
#[derive(Debug, Deserialize)]
pub struct KeepAliveReply {
    #[serde(default, alias = "ok", alias = "valid")]
    pub success: bool,
}

// ============================================================================
// Request bodies
// ============================================================================

/// `DbExplorerSP.executeQuery` request body
#[derive(Debug, Serialize)]
pub struct QueryBody<'a> {
    pub sql: &'a str,
    pub params: BTreeMap<String, Value>,
}

impl<'a> QueryBody<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self {
            sql,
            params: BTreeMap::new(),
        }
    }
}

/// `{"$": value}` wrapper used by login bodies
#[derive(Debug, Serialize)]
pub struct DollarValue<'a> {
    #[serde(rename = "$")]
    pub value: &'a str,
}

/// `MobileLoginSP.login` request body
#[derive(Debug, Serialize)]
pub struct MobileLoginBody<'a> {
    #[serde(rename = "NOMUSU")]
    pub username: DollarValue<'a>,
    #[serde(rename = "INTERNO")]
    pub password: DollarValue<'a>,
    #[serde(rename = "KEEPCONNECTED")]
    pub keep_connected: DollarValue<'a>,
}

impl<'a> MobileLoginBody<'a> {
    pub fn new(username: &'a str, password: &'a str) -> Self {
        Self {
            username: DollarValue { value: username },
            password: DollarValue { value: password },
            keep_connected: DollarValue { value: "S" },
        }
    }
}

/// `DatasetSP.save` request body
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSaveBody {
    pub entity_name: String,
    pub fields: Vec<String>,
    pub records: Vec<DatasetRecord>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stand_alone: bool,
}

impl DatasetSaveBody {
    pub fn new(entity_name: &str, fields: &[&str], records: Vec<DatasetRecord>) -> Self {
        Self {
            entity_name: entity_name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            records,
            stand_alone: false,
        }
    }
}

/// One record of a save. `values` is keyed by the field's position in
/// `DatasetSaveBody::fields`; `pk` is present for updates only.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DatasetRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pk: Option<BTreeMap<String, String>>,
    pub values: BTreeMap<String, String>,
}

impl DatasetRecord {
    /// Record with values at explicit field positions
    pub fn at<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        Self {
            pk: None,
            values: values
                .into_iter()
                .map(|(pos, v)| (pos.to_string(), v.into()))
                .collect(),
        }
    }

    /// Record with values for every field, in order
    pub fn positional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::at(values.into_iter().enumerate())
    }

    pub fn with_pk<I>(mut self, pk: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, String)>,
    {
        self.pk = Some(pk.into_iter().map(|(k, v)| (k.to_string(), v)).collect());
        self
    }

    /// Value stored at a field position
    pub fn value(&self, pos: usize) -> Option<&str> {
        self.values.get(&pos.to_string()).map(String::as_str)
    }
}

/// `ActionButtonsSP.executeScript` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteScriptBody {
    pub run_script: RunScript,
    pub client_event_list: ClientEventList,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunScript {
    #[serde(rename = "actionID")]
    pub action_id: String,
    #[serde(rename = "refreshType")]
    pub refresh_type: String,
    pub params: ScriptParams,
    pub rows: ScriptRows,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptParams {
    pub param: Vec<ScriptParam>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptParam {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "paramName")]
    pub name: String,
    #[serde(rename = "$")]
    pub value: Value,
}

impl ScriptParam {
    /// String-typed parameter (`S`)
    pub fn string(name: &str, value: impl Into<String>) -> Self {
        Self {
            kind: "S".to_string(),
            name: name.to_string(),
            value: Value::String(value.into()),
        }
    }

    /// Float-typed parameter (`F`)
    pub fn float(name: &str, value: f64) -> Self {
        Self {
            kind: "F".to_string(),
            name: name.to_string(),
            value: serde_json::Number::from_f64(value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }

    /// Date-typed parameter (`D`), `dd/mm/yyyy`
    pub fn date(name: &str, value: impl Into<String>) -> Self {
        Self {
            kind: "D".to_string(),
            name: name.to_string(),
            value: Value::String(value.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRows {
    pub row: Vec<ScriptRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRow {
    pub field: Vec<ScriptField>,
}

impl ScriptRow {
    pub fn new<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, String)>,
    {
        Self {
            field: fields
                .into_iter()
                .map(|(name, value)| ScriptField {
                    name: name.to_string(),
                    value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptField {
    #[serde(rename = "fieldName")]
    pub name: String,
    #[serde(rename = "$")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEventList {
    pub client_event: Vec<BTreeMap<String, String>>,
}

impl ClientEventList {
    /// Pre-confirms the action's confirmation dialog
    pub fn confirm() -> Self {
        let mut event = BTreeMap::new();
        event.insert(
            "$".to_string(),
            "br.com.sankhya.actionbutton.clientconfirm".to_string(),
        );
        Self {
            client_event: vec![event],
        }
    }
}

/// `ActionButtonsSP.executeSTP` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteStpBody {
    pub stp_call: StpCall,
}

#[derive(Debug, Clone, Serialize)]
pub struct StpCall {
    #[serde(rename = "actionID")]
    pub action_id: String,
    #[serde(rename = "procName")]
    pub proc_name: String,
    #[serde(rename = "rootEntity")]
    pub root_entity: String,
    pub rows: ScriptRows,
}
