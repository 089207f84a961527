//! Resilient ERP invocation
//!
//! Every ERP call goes through [`ResilientInvoker::invoke`], a bounded
//! attempt loop:
//!
//! ```text
//! Attempt ──► Success            return reply
//!        ├──► Retry(reason)      session-invalid or transport failure:
//!        │                       invalidate system credential, back off, loop
//!        └──► Fatal(error)       hard rejection / credential failure: return
//! ```
//!
//! Exhausting the budget on retryable failures yields
//! [`ErpError::SessionInstability`] carrying the last ERP message, or the
//! transport error text when the ERP never answered.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::credential::CredentialCache;
use super::error::ErpError;
use super::http::{CallAuth, ErpTransport};
use super::types::ServiceReply;

/// Attempts per call before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Fixed pause between attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Whose identity a call runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution<'a> {
    /// Backend's system credential
    System,
    /// Operator's external session handle
    User(&'a str),
}

/// Tri-state classification of an ERP reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Success,
    SessionInvalid,
    Hard,
}

impl ReplyStatus {
    /// `1`/`2` are success. `3`, or `0` with a token/session message, means
    /// the credential or session was rejected. Anything else is a hard error.
    pub fn classify(reply: &ServiceReply) -> Self {
        match reply.status.as_str() {
            "1" | "2" => ReplyStatus::Success,
            "3" => ReplyStatus::SessionInvalid,
            "0" if mentions_session(&reply.status_message) => ReplyStatus::SessionInvalid,
            _ => ReplyStatus::Hard,
        }
    }
}

fn mentions_session(message: &str) -> bool {
    message.contains("Token") || message.contains("Sessão")
}

enum Step {
    Done(ServiceReply),
    Retry(ErpError),
    Fatal(ErpError),
}

pub struct ResilientInvoker {
    transport: Arc<dyn ErpTransport>,
    credentials: Arc<CredentialCache>,
    policy: RetryPolicy,
}

impl ResilientInvoker {
    pub fn new(
        transport: Arc<dyn ErpTransport>,
        credentials: Arc<CredentialCache>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            credentials,
            policy,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    pub fn transport(&self) -> &Arc<dyn ErpTransport> {
        &self.transport
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `service` with `body`, retrying transient failures.
    pub async fn invoke(
        &self,
        service: &str,
        attribution: Attribution<'_>,
        body: &Value,
    ) -> Result<ServiceReply, ErpError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut erp_message: Option<String> = None;
        let mut transport_message = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(service, attribution, body).await {
                Step::Done(reply) => {
                    debug!(service, attempt, "ERP call succeeded");
                    return Ok(reply);
                }
                Step::Fatal(e) => {
                    error!(service, attempt, error = %e, "ERP call failed");
                    return Err(e);
                }
                Step::Retry(e) => {
                    warn!(service, attempt, max_attempts, error = %e, "ERP call transient failure");
                    match e {
                        ErpError::SessionInstability { message, .. } => erp_message = Some(message),
                        other => transport_message = other.to_string(),
                    }
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }

        Err(ErpError::SessionInstability {
            service: service.to_string(),
            attempts: max_attempts,
            message: erp_message.unwrap_or(transport_message),
        })
    }

    async fn attempt(&self, service: &str, attribution: Attribution<'_>, body: &Value) -> Step {
        let bearer;
        let auth = match attribution {
            Attribution::System => {
                bearer = match self.credentials.get().await {
                    Ok(token) => token,
                    Err(e) => return Step::Fatal(e),
                };
                CallAuth::Bearer(&bearer)
            }
            Attribution::User(handle) => CallAuth::Session(handle),
        };

        let reply = match self.transport.call(service, auth, body).await {
            Ok(reply) => reply,
            Err(e @ ErpError::Transport(_)) => return Step::Retry(e),
            Err(e) => return Step::Fatal(e),
        };

        match ReplyStatus::classify(&reply) {
            ReplyStatus::Success => Step::Done(reply),
            ReplyStatus::SessionInvalid => {
                if let CallAuth::Bearer(token) = auth {
                    self.credentials.invalidate_token(token).await;
                }
                Step::Retry(ErpError::SessionInstability {
                    service: service.to_string(),
                    attempts: 0,
                    message: reply.status_message,
                })
            }
            ReplyStatus::Hard => Step::Fatal(ErpError::HardError {
                service: service.to_string(),
                message: if reply.status_message.is_empty() {
                    format!("unknown ERP error (status {})", reply.status)
                } else {
                    reply.status_message
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::http::mock::MockTransport;
    use serde_json::json;

    fn invoker(transport: Arc<MockTransport>) -> ResilientInvoker {
        let creds = Arc::new(CredentialCache::new(
            transport.clone(),
            Duration::from_secs(290),
            Duration::from_secs(10),
        ));
        ResilientInvoker::new(transport, creds, RetryPolicy::default())
    }

    #[test]
    fn test_classify() {
        let ok = ServiceReply::new("1", "", Value::Null);
        let warn = ServiceReply::new("2", "aviso", Value::Null);
        let expired = ServiceReply::new("3", "", Value::Null);
        let token = ServiceReply::new("0", "Token inválido", Value::Null);
        let session = ServiceReply::new("0", "Sessão expirada", Value::Null);
        let hard = ServiceReply::new("0", "Campo obrigatório", Value::Null);
        assert_eq!(ReplyStatus::classify(&ok), ReplyStatus::Success);
        assert_eq!(ReplyStatus::classify(&warn), ReplyStatus::Success);
        assert_eq!(ReplyStatus::classify(&expired), ReplyStatus::SessionInvalid);
        assert_eq!(ReplyStatus::classify(&token), ReplyStatus::SessionInvalid);
        assert_eq!(ReplyStatus::classify(&session), ReplyStatus::SessionInvalid);
        assert_eq!(ReplyStatus::classify(&hard), ReplyStatus::Hard);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_session_invalid_exhausts_budget() {
        let transport = Arc::new(MockTransport::new());
        transport.push_reply("3", "Sessão expirada", Value::Null);
        let inv = invoker(transport.clone());

        let err = inv
            .invoke("DatasetSP.save", Attribution::System, &json!({}))
            .await
            .unwrap_err();

        assert_eq!(transport.call_count(), DEFAULT_MAX_ATTEMPTS as usize);
        assert_eq!(
            err,
            ErpError::SessionInstability {
                service: "DatasetSP.save".into(),
                attempts: DEFAULT_MAX_ATTEMPTS,
                message: "Sessão expirada".into(),
            }
        );
        // Each rejection invalidated the system credential
        assert_eq!(transport.login_count(), DEFAULT_MAX_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_error_single_attempt() {
        let transport = Arc::new(MockTransport::new());
        transport.push_reply("0", "Campo obrigatório", Value::Null);
        let inv = invoker(transport.clone());

        let err = inv
            .invoke("DatasetSP.save", Attribution::User("JS1"), &json!({}))
            .await
            .unwrap_err();

        assert_eq!(transport.call_count(), 1);
        assert!(matches!(err, ErpError::HardError { .. }));
        assert_eq!(err.external_message(), "Campo obrigatório");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient() {
        let transport = Arc::new(MockTransport::new());
        transport.push_error(ErpError::Transport("connection reset".into()));
        transport.push_reply("0", "Token expirado", Value::Null);
        transport.push_reply("1", "", json!({"rows": []}));
        let inv = invoker(transport.clone());

        let reply = inv
            .invoke("DbExplorerSP.executeQuery", Attribution::System, &json!({}))
            .await
            .unwrap();

        assert_eq!(reply.status, "1");
        assert_eq!(transport.call_count(), 3);
        // Only the token rejection forced a new login
        assert_eq!(transport.login_count(), 2);
        assert_eq!(
            transport.seen_auth(),
            vec!["bearer:bearer-1", "bearer:bearer-1", "bearer:bearer-2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_transport_failure_is_instability() {
        let transport = Arc::new(MockTransport::new());
        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            transport.push_error(ErpError::Transport("connection reset".into()));
        }
        let inv = invoker(transport.clone());

        let err = inv
            .invoke("DatasetSP.save", Attribution::User("JS1"), &json!({}))
            .await
            .unwrap_err();

        assert_eq!(transport.call_count(), DEFAULT_MAX_ATTEMPTS as usize);
        match err {
            ErpError::SessionInstability { attempts, message, .. } => {
                assert_eq!(attempts, DEFAULT_MAX_ATTEMPTS);
                assert!(message.contains("connection reset"), "{}", message);
            }
            other => panic!("expected SessionInstability, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_erp_message_survives_trailing_transport_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push_reply("3", "Sessão expirada", Value::Null);
        transport.push_reply("3", "Sessão expirada", Value::Null);
        transport.push_error(ErpError::Transport("reset".into()));
        let inv = invoker(transport.clone());

        let err = inv
            .invoke("DatasetSP.save", Attribution::System, &json!({}))
            .await
            .unwrap_err();

        assert_eq!(transport.call_count(), 3);
        assert_eq!(
            err,
            ErpError::SessionInstability {
                service: "DatasetSP.save".into(),
                attempts: 3,
                message: "Sessão expirada".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_attribution_never_logs_in() {
        let transport = Arc::new(MockTransport::new());
        transport.push_reply("3", "", Value::Null);
        let inv = invoker(transport.clone());

        let err = inv
            .invoke("DatasetSP.save", Attribution::User("JS9"), &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, ErpError::SessionInstability { .. }));
        assert_eq!(transport.login_count(), 0);
        assert!(transport.seen_auth().iter().all(|a| a == "session:JS9"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_failure_is_fatal() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fail_login(true);
        let inv = invoker(transport.clone());

        let err = inv
            .invoke("DbExplorerSP.executeQuery", Attribution::System, &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, ErpError::CredentialUnavailable(_)));
        assert_eq!(transport.call_count(), 0);
        assert_eq!(transport.login_count(), 1);
    }
}
