//! ERP HTTP transport
//!
//! Raw exchanges with the ERP gateway. No retry or credential handling here;
//! that lives in [`super::invoker`] and [`super::credential`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use super::error::ErpError;
use super::types::{KeepAliveReply, LoginReply, ServiceReply, SystemServiceRequest, UserServiceRequest};
use crate::config::ErpConfig;

/// How a service call is authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAuth<'a> {
    /// System bearer token (`Authorization: Bearer ..`)
    Bearer(&'a str),
    /// Operator session handle (`Cookie: JSESSIONID=..`)
    Session(&'a str),
}

/// Raw ERP exchanges
#[async_trait]
pub trait ErpTransport: Send + Sync {
    /// Exchange the static system identity for a bearer token
    async fn login(&self) -> Result<String, ErpError>;

    /// Call a named service. A non-success `status` is NOT an error at this
    /// level; the caller classifies the reply.
    async fn call(
        &self,
        service: &str,
        auth: CallAuth<'_>,
        body: &Value,
    ) -> Result<ServiceReply, ErpError>;

    /// Lightweight ping keeping an operator session alive.
    /// Returns the endpoint's boolean verdict.
    async fn keep_alive(&self, session_handle: &str) -> Result<bool, ErpError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    transaction_url: String,
    renew_url: String,
    app_key: String,
    token: String,
    username: String,
    password: String,
}

impl HttpTransport {
    pub fn new(cfg: &ErpConfig) -> Result<Self, ErpError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.http_timeout_ms))
            .build()
            .map_err(|e| ErpError::Transport(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            transaction_url: cfg.transaction_url.trim_end_matches('/').to_string(),
            renew_url: cfg.renew_url.clone(),
            app_key: cfg.app_key.clone(),
            token: cfg.token.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        })
    }

    fn system_url(&self, service: &str) -> String {
        format!(
            "{}/gateway/v1/mge/service.sbr?serviceName={}&outputType=json",
            self.api_url, service
        )
    }

    fn session_url(&self, service: &str) -> String {
        format!(
            "{}/service.sbr?serviceName={}&outputType=json",
            self.transaction_url, service
        )
    }

    async fn read_reply(service: &str, resp: reqwest::Response) -> Result<ServiceReply, ErpError> {
        let status = resp.status();
        if status.is_server_error() {
            return Err(ErpError::Transport(format!(
                "{} answered HTTP {}",
                service, status
            )));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Surfaces as session-invalid so the invoker renews and retries
            return Ok(ServiceReply::new(
                "3",
                &format!("HTTP {}", status.as_u16()),
                Value::Null,
            ));
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ErpError::Decode(format!("{} (HTTP {}): {}", service, status.as_u16(), e))
        })
    }
}

#[async_trait]
impl ErpTransport for HttpTransport {
    async fn login(&self) -> Result<String, ErpError> {
        let url = format!("{}/login", self.api_url);
        let resp = self
            .client
            .post(&url)
            .header("token", &self.token)
            .header("appkey", &self.app_key)
            .header("username", &self.username)
            .header("password", &self.password)
            .send()
            .await
            .map_err(|e| ErpError::CredentialUnavailable(format!("login request: {}", e)))?;

        if resp.status() != StatusCode::OK {
            return Err(ErpError::CredentialUnavailable(format!(
                "login answered HTTP {}",
                resp.status()
            )));
        }

        let reply: LoginReply = resp
            .json()
            .await
            .map_err(|e| ErpError::CredentialUnavailable(format!("login decode: {}", e)))?;

        if reply.bearer_token.is_empty() {
            return Err(ErpError::CredentialUnavailable(format!(
                "no bearer token returned (error: {})",
                reply.error
            )));
        }
        Ok(reply.bearer_token)
    }

    async fn call(
        &self,
        service: &str,
        auth: CallAuth<'_>,
        body: &Value,
    ) -> Result<ServiceReply, ErpError> {
        let request = match auth {
            CallAuth::Bearer(token) => {
                let payload = SystemServiceRequest {
                    service_name: service,
                    request_body: body,
                };
                self.client
                    .post(self.system_url(service))
                    .bearer_auth(token)
                    .json(&payload)
            }
            CallAuth::Session(handle) => {
                let payload = UserServiceRequest { request_body: body };
                self.client
                    .post(self.session_url(service))
                    .header(reqwest::header::COOKIE, format!("JSESSIONID={}", handle))
                    .json(&payload)
            }
        };

        debug!(service, session = matches!(auth, CallAuth::Session(_)), "ERP call");
        let resp = request.send().await?;
        Self::read_reply(service, resp).await
    }

    async fn keep_alive(&self, session_handle: &str) -> Result<bool, ErpError> {
        let resp = self
            .client
            .post(&self.renew_url)
            .header(reqwest::header::COOKIE, format!("JSESSIONID={}", session_handle))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Ok(false);
        }
        let reply: KeepAliveReply = resp.json().await?;
        Ok(reply.success)
    }
}

/// Scripted transport for tests
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub enum Scripted {
        Reply(ServiceReply),
        Fail(ErpError),
    }

    /// Replies are consumed in order; once exhausted the last one repeats.
    pub struct MockTransport {
        replies: Mutex<VecDeque<Scripted>>,
        last: Mutex<Option<ServiceReply>>,
        login_count: AtomicUsize,
        call_count: AtomicUsize,
        fail_login: Mutex<bool>,
        seen_auth: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                last: Mutex::new(None),
                login_count: AtomicUsize::new(0),
                call_count: AtomicUsize::new(0),
                fail_login: Mutex::new(false),
                seen_auth: Mutex::new(Vec::new()),
            }
        }

        pub fn push_reply(&self, status: &str, message: &str, body: Value) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Scripted::Reply(ServiceReply::new(status, message, body)));
        }

        pub fn push_error(&self, err: ErpError) {
            self.replies.lock().unwrap().push_back(Scripted::Fail(err));
        }

        pub fn set_fail_login(&self, fail: bool) {
            *self.fail_login.lock().unwrap() = fail;
        }

        pub fn login_count(&self) -> usize {
            self.login_count.load(Ordering::SeqCst)
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn seen_auth(&self) -> Vec<String> {
            self.seen_auth.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ErpTransport for MockTransport {
        async fn login(&self) -> Result<String, ErpError> {
            let n = self.login_count.fetch_add(1, Ordering::SeqCst) + 1;
            if *self.fail_login.lock().unwrap() {
                return Err(ErpError::CredentialUnavailable("mock login refused".into()));
            }
            Ok(format!("bearer-{}", n))
        }

        async fn call(
            &self,
            _service: &str,
            auth: CallAuth<'_>,
            _body: &Value,
        ) -> Result<ServiceReply, ErpError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.seen_auth.lock().unwrap().push(match auth {
                CallAuth::Bearer(t) => format!("bearer:{}", t),
                CallAuth::Session(h) => format!("session:{}", h),
            });

            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(reply)) => {
                    *self.last.lock().unwrap() = Some(reply.clone());
                    Ok(reply)
                }
                Some(Scripted::Fail(err)) => Err(err),
                None => Ok(self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| ServiceReply::new("1", "", Value::Null))),
            }
        }

        async fn keep_alive(&self, _session_handle: &str) -> Result<bool, ErpError> {
            Ok(true)
        }
    }
}
