//! Typed ERP operations
//!
//! [`Erp`] is the seam between the core (sessions, orchestration, login) and
//! the ERP. [`ErpClient`] implements it on top of the resilient invoker.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::credential::CredentialStatus;
use super::error::ErpError;
use super::invoker::{Attribution, ResilientInvoker};
use super::rows::{FromRow, decode_all};
use super::types::{
    DatasetSaveBody, ExecuteScriptBody, ExecuteStpBody, MobileLoginBody, QueryBody, ServiceReply,
    services,
};

#[async_trait]
pub trait Erp: Send + Sync {
    /// Read query, always system-attributed
    async fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>, ErpError>;

    /// `DatasetSP.save`
    async fn save(
        &self,
        body: &DatasetSaveBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError>;

    /// `ActionButtonsSP.executeScript`
    async fn execute_script(
        &self,
        body: &ExecuteScriptBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError>;

    /// `ActionButtonsSP.executeSTP`
    async fn execute_procedure(
        &self,
        body: &ExecuteStpBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError>;

    /// Operator login; returns the external session handle
    async fn login_user(&self, username: &str, password: &str) -> Result<String, ErpError>;

    /// Session keep-alive ping
    async fn keep_alive(&self, session_handle: &str) -> Result<bool, ErpError>;

    async fn credential_status(&self) -> CredentialStatus;
}

/// Run a query and decode every row as `T`
pub async fn query_as<T: FromRow>(erp: &dyn Erp, sql: &str) -> Result<Vec<T>, ErpError> {
    let rows = erp.query(sql).await?;
    Ok(decode_all(&rows))
}

/// Quote-stripped text for interpolation into ERP SQL. The query service
/// takes no bind parameters.
pub fn sql_text(s: &str) -> String {
    s.replace('\'', "")
}

pub struct ErpClient {
    invoker: ResilientInvoker,
}

impl ErpClient {
    pub fn new(invoker: ResilientInvoker) -> Self {
        Self { invoker }
    }

    pub fn into_shared(self) -> Arc<dyn Erp> {
        Arc::new(self)
    }

    async fn invoke_serialized<T: Serialize + Sync>(
        &self,
        service: &str,
        body: &T,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError> {
        let value = serde_json::to_value(body)?;
        self.invoker.invoke(service, attribution, &value).await
    }
}

#[async_trait]
impl Erp for ErpClient {
    async fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>, ErpError> {
        let reply = self
            .invoke_serialized(services::EXECUTE_QUERY, &QueryBody::new(sql), Attribution::System)
            .await?;
        reply.rows()
    }

    async fn save(
        &self,
        body: &DatasetSaveBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError> {
        self.invoke_serialized(services::DATASET_SAVE, body, attribution)
            .await
    }

    async fn execute_script(
        &self,
        body: &ExecuteScriptBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError> {
        self.invoke_serialized(services::EXECUTE_SCRIPT, body, attribution)
            .await
    }

    async fn execute_procedure(
        &self,
        body: &ExecuteStpBody,
        attribution: Attribution<'_>,
    ) -> Result<ServiceReply, ErpError> {
        self.invoke_serialized(services::EXECUTE_STP, body, attribution)
            .await
    }

    async fn login_user(&self, username: &str, password: &str) -> Result<String, ErpError> {
        let reply = self
            .invoke_serialized(
                services::MOBILE_LOGIN,
                &MobileLoginBody::new(username, password),
                Attribution::System,
            )
            .await?;

        if reply.status != "1" {
            return Err(ErpError::HardError {
                service: services::MOBILE_LOGIN.to_string(),
                message: reply.status_message,
            });
        }
        reply.jsessionid().ok_or_else(|| ErpError::HardError {
            service: services::MOBILE_LOGIN.to_string(),
            message: "jsessionid missing from login reply".to_string(),
        })
    }

    async fn keep_alive(&self, session_handle: &str) -> Result<bool, ErpError> {
        self.invoker.transport().keep_alive(session_handle).await
    }

    async fn credential_status(&self) -> CredentialStatus {
        self.invoker.credentials().status().await
    }
}
