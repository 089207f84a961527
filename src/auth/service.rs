//! Operator login / logout
//!
//! Login sequence:
//! 1. the ERP user exists and has app access (`TSIUSU` + `AD_APPPERM`)
//! 2. the device is registered and approved (`AD_DISPAUT`); an unknown
//!    device is registered as inactive and the login is refused
//! 3. ERP user login, yielding the session handle (`JSESSIONID`)
//! 4. JWT issued and registered with the session handle

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::error::AuthError;
use super::token::{Claims, TokenIssuer};
use crate::erp::rows::{DeviceRow, UserAccessRow};
use crate::erp::types::{DatasetRecord, DatasetSaveBody};
use crate::erp::{Attribution, Erp, ErpError, query_as, sql_text};
use crate::session::SessionRegistry;

const DEVICE_ENTITY: &str = "AD_DISPAUT";
const DEVICE_FIELDS: [&str; 5] = ["CODUSU", "DEVICETOKEN", "DESCRDISP", "ATIVO", "DHGER"];
const NEW_DEVICE_DESCRIPTION: &str = "Novo Dispositivo";

/// Login Request
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[schema(example = "ANA")]
    pub username: String,
    pub password: String,
    /// Omitted on a device's first login; a new one is generated
    #[serde(default)]
    pub device_token: Option<String>,
}

/// Login Response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub username: String,
    pub codusu: i64,
    #[serde(rename = "sessionToken")]
    pub session_token: String,
    #[serde(rename = "snkjsessionid")]
    pub snk_session_id: String,
    #[serde(rename = "deviceToken")]
    pub device_token: String,
}

pub struct OperatorAuth {
    erp: Arc<dyn Erp>,
    sessions: Arc<SessionRegistry>,
    tokens: TokenIssuer,
}

impl OperatorAuth {
    pub fn new(erp: Arc<dyn Erp>, sessions: Arc<SessionRegistry>, tokens: TokenIssuer) -> Self {
        Self {
            erp,
            sessions,
            tokens,
        }
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AuthError> {
        let device_token = req
            .device_token
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let codusu = self.verify_user_access(&req.username).await?;
        self.verify_device(codusu, &device_token).await?;

        let snk_session_id = self
            .erp
            .login_user(&req.username, &req.password)
            .await
            .map_err(|e| match e {
                ErpError::HardError { message, .. } => AuthError::InvalidCredentials(message),
                other => AuthError::from(other),
            })?;

        let session_token = self.tokens.issue(&req.username, codusu)?;
        self.sessions.register(&session_token, &snk_session_id).await?;

        info!(username = %req.username, codusu, "Operator logged in");
        Ok(LoginResponse {
            username: req.username,
            codusu,
            session_token,
            snk_session_id,
            device_token,
        })
    }

    /// Drop the operator's session. Idempotent.
    pub async fn logout(&self, token: &str) -> Result<bool, AuthError> {
        Ok(self.sessions.revoke(token).await?)
    }

    /// Verify the JWT, then resolve and refresh its session.
    /// Returns the claims and the ERP session handle.
    pub async fn authenticate(&self, token: &str) -> Result<(Claims, String), AuthError> {
        let claims = self.tokens.verify(token)?;
        let handle = self.sessions.validate_and_refresh(token).await?;
        Ok((claims, handle))
    }

    async fn verify_user_access(&self, username: &str) -> Result<i64, AuthError> {
        let sql = format!(
            "SELECT U.CODUSU, \
             CASE WHEN EXISTS (SELECT 1 FROM AD_APPPERM P WHERE P.CODUSU = U.CODUSU) \
             THEN 'TRUE' ELSE 'FALSE' END AS PERMITIDO \
             FROM TSIUSU U WHERE U.NOMEUSU = '{}'",
            sql_text(&username.to_uppercase())
        );
        let rows: Vec<UserAccessRow> = query_as(self.erp.as_ref(), &sql).await?;
        let user = rows.into_iter().next().ok_or(AuthError::UserNotFound)?;
        if !user.permitted {
            warn!(username, "User without app access");
            return Err(AuthError::UserNotAuthorized);
        }
        Ok(user.cod_usu)
    }

    async fn verify_device(&self, codusu: i64, device_token: &str) -> Result<(), AuthError> {
        let sql = format!(
            "SELECT DEVICETOKEN, CODUSU, ATIVO FROM AD_DISPAUT \
             WHERE CODUSU = {} AND DEVICETOKEN = '{}'",
            codusu,
            sql_text(device_token)
        );
        let rows: Vec<DeviceRow> = query_as(self.erp.as_ref(), &sql).await?;

        match rows.into_iter().next() {
            Some(device) if device.active => Ok(()),
            Some(_) => Err(AuthError::DevicePendingApproval {
                device_token: device_token.to_string(),
            }),
            None => {
                self.register_device(codusu, device_token).await?;
                info!(codusu, "New device registered, pending approval");
                Err(AuthError::DevicePendingApproval {
                    device_token: device_token.to_string(),
                })
            }
        }
    }

    async fn register_device(&self, codusu: i64, device_token: &str) -> Result<(), AuthError> {
        let today = chrono::Local::now().format("%d/%m/%Y").to_string();
        let body = DatasetSaveBody::new(
            DEVICE_ENTITY,
            &DEVICE_FIELDS,
            vec![DatasetRecord::positional([
                codusu.to_string(),
                device_token.to_string(),
                NEW_DEVICE_DESCRIPTION.to_string(),
                "N".to_string(),
                today,
            ])],
        );
        self.erp.save(&body, Attribution::System).await?;
        Ok(())
    }
}
