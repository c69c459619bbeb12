//! relaywire gateway binary.
//!
//! - Config: `$RELAYWIRE_CONFIG` or `relaywire.yaml` (strict parsing + validate)
//! - Broker: in-process, or Redis pub/sub with the `redis` feature
//! - WebSocket endpoint: /v1/ws, plus /metrics and /healthz
//! - SIGINT/SIGTERM: stop accepting, drain worker tasks within `shutdown.grace_ms`

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use relaywire_core::error::{RelayError, Result};
use relaywire_gateway::broker::{Broker, MemoryBroker};
use relaywire_gateway::config::{BrokerKind, BrokerSection};
use relaywire_gateway::{app_state, config, router, services};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "relaywire-gateway failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::var("RELAYWIRE_CONFIG").unwrap_or_else(|_| "relaywire.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| RelayError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}")))?;
    let grace = Duration::from_millis(cfg.shutdown.grace_ms);

    let broker = connect_broker(&cfg.broker).await?;
    let state = app_state::AppState::new(cfg, broker)?;
    services::seed_demo_bots(&state.bots());
    state.start().await?;

    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path, "relaywire-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| RelayError::Internal(format!("failed to bind {listen}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RelayError::Internal(format!("server failed: {e}")))?;

    state.shutdown(grace).await?;
    tracing::info!("relaywire-gateway stopped");
    Ok(())
}

async fn connect_broker(cfg: &BrokerSection) -> Result<Arc<dyn Broker>> {
    match cfg.kind {
        BrokerKind::Memory => Ok(Arc::new(MemoryBroker::new())),
        #[cfg(feature = "redis")]
        BrokerKind::Redis => {
            let url = cfg.url.as_deref().unwrap_or_default();
            let broker = relaywire_gateway::broker::RedisBroker::connect(url).await?;
            Ok(Arc::new(broker))
        }
        #[cfg(not(feature = "redis"))]
        BrokerKind::Redis => Err(RelayError::BadRequest(
            "broker.kind = redis requires the `redis` feature".into(),
        )),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("signal received, starting graceful shutdown");
}
