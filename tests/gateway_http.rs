//! HTTP gateway end to end, over a real socket

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use common::FakeErp;
use stockgate::auth::{OperatorAuth, TokenIssuer};
use stockgate::erp::ConsistencyWaiter;
use stockgate::gateway::{self, AppState};
use stockgate::session::SessionRegistry;
use stockgate::transaction::TransactionOrchestrator;

struct TestServer {
    base: String,
    erp: Arc<FakeErp>,
    sessions: Arc<SessionRegistry>,
    client: reqwest::Client,
}

async fn start(erp: FakeErp) -> TestServer {
    let erp = Arc::new(erp);
    let sessions = Arc::new(SessionRegistry::new(
        Duration::from_secs(3000),
        Duration::from_secs(15),
    ));
    let auth = Arc::new(OperatorAuth::new(
        erp.clone(),
        sessions.clone(),
        TokenIssuer::new("gateway-test-secret", Duration::from_secs(3000)),
    ));
    let orchestrator = Arc::new(TransactionOrchestrator::new(
        erp.clone(),
        ConsistencyWaiter::new(3, Duration::from_millis(5)),
    ));
    let state = Arc::new(AppState::new(
        auth,
        orchestrator,
        erp.clone(),
        sessions.clone(),
        Duration::from_secs(60),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, gateway::router(state)).await.unwrap();
    });

    TestServer {
        base: format!("http://{}/apiv1", addr),
        erp,
        sessions,
        client: reqwest::Client::new(),
    }
}

fn operator_erp() -> FakeErp {
    let erp = FakeErp::new();
    erp.on_query("FROM TSIUSU U", json!([[31, "TRUE"]]));
    erp.on_query("FROM AD_DISPAUT", json!([["dev-1", 31, "S"]]));
    erp
}

impl TestServer {
    async fn login(&self, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/login", self.base))
            .json(&json!({"username": "ana", "password": password, "deviceToken": "dev-1"}))
            .send()
            .await
            .unwrap()
    }

    async fn login_token(&self) -> String {
        let body: Value = self.login("pw").await.json().await.unwrap();
        body["data"]["sessionToken"].as_str().unwrap().to_string()
    }

    async fn execute(&self, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/execute-transaction", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn login_returns_session_token() {
    let server = start(operator_erp()).await;

    let resp = server.login("pw").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["codusu"], 31);
    assert_eq!(body["data"]["snkjsessionid"], "JSESSION-FAKE");
    assert_eq!(body["data"]["deviceToken"], "dev-1");
    assert_eq!(server.sessions.count_active().await.unwrap(), 1);
}

#[tokio::test]
async fn wrong_password_is_401() {
    let server = start(operator_erp()).await;

    let resp = server.login("wrong").await;
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["error"], "INVALID_CREDENTIALS");
    assert_eq!(server.sessions.count_active().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_device_is_403_with_token() {
    let erp = FakeErp::new();
    erp.on_query("FROM TSIUSU U", json!([[31, "TRUE"]]));
    let server = start(erp).await;

    let resp = server
        .client
        .post(format!("{}/login", server.base))
        .json(&json!({"username": "ana", "password": "pw"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["error"], "DEVICE_PENDING_APPROVAL");
    assert!(body["data"]["deviceToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(server.erp.writes()[0].entity.as_deref(), Some("AD_DISPAUT"));
}

#[tokio::test]
async fn withdrawal_runs_under_operator_session() {
    let erp = operator_erp();
    erp.grant(false, true, false, false);
    erp.on_query("SELECT CODPROD, ENDPIC FROM AD_CADEND", json!([[500, "N"]]));
    erp.on_query("SELECT COUNT(*) FROM AD_IBXEND", json!([[1]]));
    let server = start(erp).await;
    let token = server.login_token().await;

    let resp = server
        .execute(
            &token,
            json!({"type": "baixa", "payload": {"origem": {"codarm": 1, "sequencia": 10}, "quantidade": 5}}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["message"], "Baixa finalizada");

    let writes = server.erp.writes();
    assert_eq!(writes.len(), 3);
    assert!(writes.iter().all(|w| w.user.as_deref() == Some("JSESSION-FAKE")));
}

#[tokio::test]
async fn permission_denied_is_403() {
    let erp = operator_erp();
    erp.grant(false, false, false, false);
    let server = start(erp).await;
    let token = server.login_token().await;

    let resp = server
        .execute(
            &token,
            json!({"type": "baixa", "payload": {"origem": {"codarm": 1, "sequencia": 10}, "quantidade": 5}}),
        )
        .await;
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["error"], "PERMISSION_DENIED");
    assert!(body["data"].get("reauthRequired").is_none());
}

#[tokio::test]
async fn unknown_transaction_type_is_400() {
    let server = start(operator_erp()).await;
    let token = server.login_token().await;

    let resp = server
        .execute(&token, json!({"type": "inventario", "payload": {}}))
        .await;
    assert_eq!(resp.status(), 400);
    assert!(server.erp.writes().is_empty());
}

#[tokio::test]
async fn logout_ends_the_session() {
    let erp = operator_erp();
    erp.grant(true, true, true, true);
    let server = start(erp).await;
    let token = server.login_token().await;

    let resp = server
        .client
        .get(format!("{}/permissions", server.base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["LISTA_CODIGOS"], "1,2");
    assert_eq!(body["data"]["TRANSF"], true);

    let resp = server
        .client
        .post(format!("{}/logout", server.base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["revoked"], true);

    let resp = server
        .client
        .get(format!("{}/permissions", server.base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["error"], "SESSION_EXPIRED");
}

#[tokio::test]
async fn missing_token_is_401() {
    let server = start(operator_erp()).await;

    let resp = server
        .client
        .post(format!("{}/execute-transaction", server.base))
        .json(&json!({"type": "baixa", "payload": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["error"], "MISSING_AUTH");
}

#[tokio::test]
async fn health_reports_sessions_and_credential() {
    let server = start(operator_erp()).await;
    server.login_token().await;

    let body: Value = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["status"], "online");
    assert_eq!(body["data"]["active_sessions"], 1);
    assert_eq!(body["data"]["credential_status"], "valid");
    assert_eq!(body["data"]["credential_expires_in_secs"], 120);
}
