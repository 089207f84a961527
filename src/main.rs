//! Stockgate server
//!
//! ```text
//! config ──► logging ──► system login ──► session store ──► keep-alive worker
//!                                    └──► HTTP gateway (until Ctrl-C / SIGTERM)
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use stockgate::auth::{OperatorAuth, TokenIssuer};
use stockgate::config::AppConfig;
use stockgate::erp::{
    ConsistencyWaiter, CredentialCache, ErpClient, ErpTransport, HttpTransport, ResilientInvoker,
    RetryPolicy,
};
use stockgate::gateway::{self, AppState};
use stockgate::session::{
    KeepAliveConfig, KeepAliveWorker, MemorySessionStore, RedisSessionStore, SessionRegistry,
    SessionStore,
};
use stockgate::transaction::TransactionOrchestrator;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = stockgate::logging::init_logging(&app_config);

    info!(
        env = %env,
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        "Starting stockgate"
    );

    // ERP stack
    let erp_cfg = &app_config.erp;
    let transport: Arc<dyn ErpTransport> =
        Arc::new(HttpTransport::new(erp_cfg).context("Failed to build ERP transport")?);
    let credentials = Arc::new(CredentialCache::new(
        transport.clone(),
        erp_cfg.token_ttl(),
        erp_cfg.token_safety_margin(),
    ));

    // Without a system credential nothing works; refuse to start.
    credentials
        .refresh()
        .await
        .context("System login to the ERP failed")?;
    info!("ERP system credential acquired");

    let invoker = ResilientInvoker::new(
        transport,
        credentials,
        RetryPolicy {
            max_attempts: erp_cfg.max_attempts,
            backoff: erp_cfg.retry_backoff(),
        },
    );
    let erp = ErpClient::new(invoker).into_shared();

    // Sessions
    let session_cfg = &app_config.session;
    let store: Arc<dyn SessionStore> = match &session_cfg.redis_url {
        Some(url) => Arc::new(
            RedisSessionStore::connect(url)
                .await
                .context("Failed to connect to the session store")?,
        ),
        None => {
            warn!("session.redis_url not set, sessions are kept in process memory");
            Arc::new(MemorySessionStore::new())
        }
    };
    let sessions = Arc::new(SessionRegistry::with_store(
        store,
        session_cfg.ttl(),
        session_cfg.ping_interval(),
    ));
    let worker = KeepAliveWorker::new(
        sessions.clone(),
        erp.clone(),
        KeepAliveConfig::for_ping_interval(session_cfg.ping_interval(), session_cfg.ping_timeout()),
    );
    tokio::spawn(async move {
        worker.run().await;
    });

    // Core services
    let auth = Arc::new(OperatorAuth::new(
        erp.clone(),
        sessions.clone(),
        TokenIssuer::new(&app_config.auth.jwt_secret, app_config.auth.token_ttl()),
    ));
    let orchestrator = Arc::new(TransactionOrchestrator::new(
        erp.clone(),
        ConsistencyWaiter::new(erp_cfg.poll_attempts, erp_cfg.poll_interval()),
    ));

    let state = Arc::new(AppState::new(
        auth,
        orchestrator,
        erp,
        sessions,
        app_config.gateway.request_timeout(),
    ));

    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(&app_config.gateway.host, port, state, shutdown_signal())
        .await
        .with_context(|| format!("Gateway failed on {}:{}", app_config.gateway.host, port))?;

    info!("Stockgate stopped");
    Ok(())
}
