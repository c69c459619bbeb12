//! WebSocket session.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS and register a [`Connection`]
//! - Lifecycle: ping/pong + idle timeout
//! - Decode-once, then route: subscribe / fetchMore / unsubscribe inline,
//!   RPC on its own task
//! - Deregister every subscription when the session ends
//!
//! Outbound frames go through a bounded queue drained by a dedicated writer
//! task, so a reliable send from the reader loop never waits on itself.

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, Instrument};

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::hybrid::{Event, Header};
use relaywire_core::protocol::rpc::RpcRequest;

use crate::app_state::AppState;
use crate::realtime::{Connection, OutFrame, QoS};
use crate::rpc::RpcCtx;
use crate::subscription::{FetchMoreRequest, SubscribeRequest};
use crate::transport::codec::{decode, Inbound};

const RPC_REPLY_TIMEOUT_MS: u64 = 5_000;
const ERROR_REPLY_TIMEOUT_MS: u64 = 1_000;
const WRITER_FLUSH: Duration = Duration::from_secs(1);

pub async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let conn_id = app.next_conn_id();
        let span = tracing::info_span!("ws_session", conn = conn_id);
        if let Err(e) = run_session(app, conn_id, socket).instrument(span).await {
            debug!(conn = conn_id, error = %e, "session ended with error");
        }
    })
}

async fn run_session(app: AppState, conn_id: u64, socket: WebSocket) -> Result<()> {
    let gw = app.cfg().gateway.clone();

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(gw.outbound_queue);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(m) = out_rx.recv().await {
            if ws_tx.send(m).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let conn = Connection::new(conn_id, out_tx);
    app.metrics().ws_sessions.inc();
    info!("session opened");

    let ping_every = Duration::from_millis(gw.ping_interval_ms);
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);
    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let Ok(msg) = incoming else { break; };
                last_activity = Instant::now();

                match decode(msg) {
                    Ok(Inbound::Close) => break,
                    Ok(Inbound::Ping(payload)) => {
                        let _ = conn.raw().try_send(Message::Pong(payload));
                    }
                    Ok(Inbound::Pong(_)) => {}
                    Ok(Inbound::Rpc { req, mode }) => {
                        conn.set_mode(mode);
                        spawn_rpc(&app, &conn, req);
                    }
                    Ok(Inbound::Frame { header, payload, mode }) => {
                        conn.set_mode(mode);
                        if let Err(e) = handle_frame(&app, &conn, &header, payload).await {
                            send_error(&app, &conn, Some(&header), &e).await;
                        }
                    }
                    Err(e) => send_error(&app, &conn, None, &e).await,
                }
            }

            _ = ping_tick.tick() => {
                let _ = conn.raw().try_send(Message::Ping(Vec::new()));
            }

            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= idle_timeout {
                    send_error(&app, &conn, None, &RelayError::domain("TIMEOUT", "idle timeout")).await;
                    break;
                }
            }
        }
    }

    let released = app.engine().close_connection(conn_id);
    app.metrics().ws_sessions.dec();
    info!(subscriptions = released, "session closed");

    // In-flight RPC tasks hold their own handles; give the writer a moment to
    // flush, then cut it so those replies are dropped.
    drop(conn);
    if tokio::time::timeout(WRITER_FLUSH, &mut writer).await.is_err() {
        writer.abort();
    }
    Ok(())
}

fn parse_payload<T: DeserializeOwned>(event: Event, payload: Value) -> Result<T> {
    let payload = if payload.is_null() { json!({}) } else { payload };
    serde_json::from_value(payload)
        .map_err(|e| RelayError::BadRequest(format!("invalid {} payload: {e}", event.as_str())))
}

async fn handle_frame(app: &AppState, conn: &Connection, header: &Header, payload: Value) -> Result<()> {
    let channel = || {
        header.channel.as_deref().ok_or_else(|| {
            RelayError::BadRequest(format!("{} requires a channel", header.event.as_str()))
        })
    };

    match header.event {
        Event::Subscribe => {
            let req: SubscribeRequest = parse_payload(header.event, payload)?;
            app.engine()
                .subscribe(conn, header.id.clone(), channel()?, req)
                .await
        }
        Event::FetchMore => {
            let req: FetchMoreRequest = parse_payload(header.event, payload)?;
            app.engine().fetch_more(conn, channel()?, req).await
        }
        Event::Unsubscribe => {
            let channel = channel()?;
            if !app.engine().unsubscribe(conn.id(), channel) {
                debug!(channel, "unsubscribe without subscription");
            }
            Ok(())
        }
        Event::Rpc => {
            let req: RpcRequest = parse_payload(header.event, payload)?;
            spawn_rpc(app, conn, req);
            Ok(())
        }
        other => Err(RelayError::BadRequest(format!(
            "unexpected client event: {}",
            other.as_str()
        ))),
    }
}

/// Run one RPC off the read loop. Exactly one `rpc_response` is produced;
/// it is discarded if the connection is gone by then.
fn spawn_rpc(app: &AppState, conn: &Connection, req: RpcRequest) {
    let dispatcher = app.dispatcher();
    let conn = conn.clone();
    tokio::spawn(
        async move {
            let id = req.id.clone();
            let ctx = RpcCtx::new(conn.id(), id.as_str());
            let reply = dispatcher.dispatch(ctx, req).await;

            if conn.is_closed() {
                debug!(request = %id, "connection gone, rpc reply dropped");
                return;
            }
            let frame = match OutFrame::new(Header::new(Event::RpcResponse).with_id(id.clone()), &reply) {
                Ok(f) => f,
                Err(e) => {
                    tracing::error!(request = %id, error = %e, "rpc reply encode failed");
                    return;
                }
            };
            if let Err(e) = conn
                .send(&frame, QoS::Reliable { timeout_ms: RPC_REPLY_TIMEOUT_MS })
                .await
            {
                debug!(request = %id, error = %e, "rpc reply dropped");
            }
        }
        .in_current_span(),
    );
}

/// `error` event back to the client; the connection stays open.
async fn send_error(app: &AppState, conn: &Connection, about: Option<&Header>, err: &RelayError) {
    app.metrics()
        .inbound_errors
        .inc(&[("code", err.wire_code())]);
    debug!(error = %err, "inbound frame rejected");

    let mut header = Header::new(Event::Error);
    if let Some(about) = about {
        header.id = about.id.clone();
        header.channel = about.channel.clone();
    }
    let body = json!({ "code": err.wire_code(), "message": err.client_message() });
    match OutFrame::new(header, &body) {
        Ok(frame) => {
            let _ = conn
                .send(&frame, QoS::Reliable { timeout_ms: ERROR_REPLY_TIMEOUT_MS })
                .await;
        }
        Err(e) => tracing::error!(error = %e, "error frame encode failed"),
    }
}
