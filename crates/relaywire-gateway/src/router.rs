//! Axum router wiring.
//!
//! - `/v1/ws`: WebSocket upgrade
//! - `/metrics`: Prometheus text counters
//! - `/healthz`: liveness

use axum::{extract::State, routing::get, Router};

use crate::{app_state::AppState, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/ws", get(transport::ws::ws_upgrade))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn metrics(State(app): State<AppState>) -> String {
    app.metrics().render()
}

async fn healthz() -> &'static str {
    "ok"
}
