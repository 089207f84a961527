//! Shared test double for the `Erp` seam

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use stockgate::erp::types::{
    DatasetSaveBody, ExecuteScriptBody, ExecuteStpBody, ServiceReply, services,
};
use stockgate::erp::{Attribution, CredentialStatus, Erp, ErpError};

#[derive(Debug, Clone)]
pub struct Write {
    pub service: &'static str,
    pub entity: Option<String>,
    pub user: Option<String>,
    pub body: Value,
}

/// Queries answered by SQL substring (first match wins, unmatched ⇒ no rows).
/// Writes are recorded and succeed with `batch_id`.
pub struct FakeErp {
    rules: Mutex<Vec<(String, Value)>>,
    writes: Mutex<Vec<Write>>,
    queries: Mutex<Vec<String>>,
    pub batch_id: String,
    pub session_handle: String,
    keep_alive_ok: Mutex<bool>,
    pings: AtomicUsize,
}

impl FakeErp {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            batch_id: "9001".to_string(),
            session_handle: "JSESSION-FAKE".to_string(),
            keep_alive_ok: Mutex::new(true),
            pings: AtomicUsize::new(0),
        }
    }

    pub fn on_query(&self, pattern: &str, rows: Value) {
        self.rules.lock().unwrap().push((pattern.to_string(), rows));
    }

    /// Operator 31 with the given flags (TRANSF, BAIXA, PICK, CORRE)
    pub fn grant(&self, transfer: bool, withdraw: bool, pick: bool, correct: bool) {
        let flag = |b: bool| if b { "S" } else { "N" };
        self.on_query(
            "FROM AD_APPPERM p",
            json!([["1,2", "1 - CD, 2 - LOJA", 31, flag(transfer), flag(withdraw), flag(pick), flag(correct), "N", "N"]]),
        );
    }

    pub fn set_keep_alive_ok(&self, ok: bool) {
        *self.keep_alive_ok.lock().unwrap() = ok;
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn queries_matching(&self, pattern: &str) -> usize {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.contains(pattern))
            .count()
    }

    fn record(&self, service: &'static str, entity: Option<String>, attribution: Attribution<'_>, body: Value) {
        let user = match attribution {
            Attribution::System => None,
            Attribution::User(h) => Some(h.to_string()),
        };
        self.writes.lock().unwrap().push(Write {
            service,
            entity,
            user,
            body,
        });
    }
}

#[async_trait]
impl Erp for FakeErp {
    async fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>, ErpError> {
        self.queries.lock().unwrap().push(sql.to_string());
        let rules = self.rules.lock().unwrap();
        match rules.iter().find(|(pattern, _)| sql.contains(pattern.as_str())) {
            Some((_, rows)) => Ok(serde_json::from_value(rows.clone()).unwrap()),
            None => Ok(Vec::new()),
        }
    }

    async fn save(
        &self,
        body: &DatasetSaveBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError> {
        self.record(
            services::DATASET_SAVE,
            Some(body.entity_name.clone()),
            attribution,
            serde_json::to_value(body).unwrap(),
        );
        Ok(ServiceReply::new("1", "", json!({"result": [[self.batch_id]]})))
    }

    async fn execute_script(
        &self,
        body: &ExecuteScriptBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError> {
        self.record(
            services::EXECUTE_SCRIPT,
            None,
            attribution,
            serde_json::to_value(body).unwrap(),
        );
        Ok(ServiceReply::new("1", "", Value::Null))
    }

    async fn execute_procedure(
        &self,
        body: &ExecuteStpBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError> {
        self.record(
            services::EXECUTE_STP,
            None,
            attribution,
            serde_json::to_value(body).unwrap(),
        );
        Ok(ServiceReply::new("1", "Baixa finalizada", Value::Null))
    }

    async fn login_user(&self, _username: &str, password: &str) -> Result<String, ErpError> {
        if password == "wrong" {
            return Err(ErpError::HardError {
                service: services::MOBILE_LOGIN.into(),
                message: "Usuário/Senha inválido".into(),
            });
        }
        Ok(self.session_handle.clone())
    }

    async fn keep_alive(&self, _session_handle: &str) -> Result<bool, ErpError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(*self.keep_alive_ok.lock().unwrap())
    }

    async fn credential_status(&self) -> CredentialStatus {
        CredentialStatus::Valid {
            expires_in: Duration::from_secs(120),
        }
    }
}
