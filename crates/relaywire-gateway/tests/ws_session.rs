#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use relaywire_core::protocol::hybrid::{decode_hybrid, encode_hybrid, Event, Header};
use relaywire_gateway::app_state::AppState;
use relaywire_gateway::broker::MemoryBroker;
use relaywire_gateway::services::{seed_demo_bots, BOTS_CHANNEL, PONG_TYPE_URL};
use relaywire_gateway::{config, router};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn gateway() -> (AppState, SocketAddr) {
    let cfg = config::load_from_str("version: 1\nipc:\n  timeout_ms: 200\n").unwrap();
    let state = AppState::new(cfg, Arc::new(MemoryBroker::new())).unwrap();
    seed_demo_bots(&state.bots());
    state.start().await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router::build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/v1/ws")).await.unwrap();
    ws
}

async fn send_text(ws: &mut Client, v: Value) {
    ws.send(Message::Text(v.to_string())).await.unwrap();
}

async fn send_binary(ws: &mut Client, header: Header, payload: Value) {
    let bytes = encode_hybrid(&header, payload.to_string().as_bytes()).unwrap();
    ws.send(Message::Binary(bytes.to_vec())).await.unwrap();
}

/// Next data frame, skipping keepalives. Returns whether it came as binary.
async fn recv(ws: &mut Client) -> (Header, Value, bool) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .unwrap();
        match msg {
            Message::Binary(b) => {
                let m = decode_hybrid(Bytes::from(b)).unwrap();
                let payload = m
                    .payload
                    .map(|p| serde_json::from_slice(&p).unwrap())
                    .unwrap_or(Value::Null);
                return (m.header, payload, true);
            }
            Message::Text(s) => {
                let v: Value = serde_json::from_str(&s).unwrap();
                let header = serde_json::from_value(v["header"].clone()).unwrap();
                return (header, v["payload"].clone(), false);
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message {other:?}"),
        }
    }
}

#[tokio::test]
async fn frames_without_a_channel_get_an_error_and_the_session_survives() {
    let (_state, addr) = gateway().await;
    let mut ws = connect(addr).await;

    send_text(&mut ws, json!({"header": {"event": "subscribe", "id": "s1"}, "payload": {}})).await;
    let (header, payload, binary) = recv(&mut ws).await;
    assert!(!binary);
    assert_eq!(header.event, Event::Error);
    assert_eq!(header.id.as_deref(), Some("s1"));
    assert_eq!(payload["code"], "BAD_REQUEST");
    assert!(payload["message"].as_str().unwrap().contains("subscribe requires a channel"));

    send_text(&mut ws, json!({"header": {"event": "fetchMore"}, "payload": {"cursor": "abc"}})).await;
    let (header, payload, _) = recv(&mut ws).await;
    assert_eq!(header.event, Event::Error);
    assert_eq!(payload["code"], "BAD_REQUEST");

    // Still open: a bare text RPC is answered.
    send_text(&mut ws, json!({"id": "r1", "method": "system.ping", "data": {"echo": "hi"}})).await;
    let (header, payload, _) = recv(&mut ws).await;
    assert_eq!(header.event, Event::RpcResponse);
    assert_eq!(header.id.as_deref(), Some("r1"));
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["method"], "system.ping");
    assert_eq!(payload["data"]["typeUrl"], PONG_TYPE_URL);
}

#[tokio::test]
async fn hybrid_rpc_frame_reaches_the_dispatcher() {
    let (state, addr) = gateway().await;
    let mut ws = connect(addr).await;

    send_binary(
        &mut ws,
        Header::new(Event::Rpc).with_id("h1"),
        json!({"id": "r7", "method": "system.ping", "data": {}}),
    )
    .await;
    let (header, payload, binary) = recv(&mut ws).await;
    assert!(binary);
    assert_eq!(header.event, Event::RpcResponse);
    assert_eq!(header.id.as_deref(), Some("r7"));
    assert_eq!(payload["status"], "ok");

    send_binary(
        &mut ws,
        Header::new(Event::Rpc),
        json!({"id": "r8", "method": "system.nope"}),
    )
    .await;
    let (_, payload, _) = recv(&mut ws).await;
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["errorCode"], "METHOD_NOT_FOUND");

    assert_eq!(
        state
            .metrics()
            .rpc_calls
            .get(&[("method", "system.ping"), ("status", "ok")]),
        1
    );
}

#[tokio::test]
async fn closing_the_socket_releases_every_subscription() {
    let (state, addr) = gateway().await;
    let mut ws = connect(addr).await;

    send_binary(
        &mut ws,
        Header::new(Event::Subscribe).with_id("s1").with_channel(BOTS_CHANNEL),
        json!({}),
    )
    .await;
    let (header, payload, _) = recv(&mut ws).await;
    assert_eq!(header.event, Event::Snapshot);
    assert_eq!(payload["data"]["count"], 3);
    assert_eq!(state.engine().hub().listener_count(BOTS_CHANNEL), 1);

    state
        .bots()
        .upsert("bot-9", json!({"status": "stopped", "owner": "carol"}));
    let (header, payload, _) = recv(&mut ws).await;
    assert_eq!(header.event, Event::Update);
    assert_eq!(payload["items"][0]["id"], "bot-9");
    assert_eq!(payload["items"][0]["action"], "added");

    ws.close(None).await.unwrap();
    let mut released = false;
    for _ in 0..100 {
        if state.engine().hub().listener_count(BOTS_CHANNEL) == 0 {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released, "listener still registered after close");

    // Later changes go nowhere and nothing breaks.
    state
        .bots()
        .upsert("bot-10", json!({"status": "stopped", "owner": "carol"}));
    assert_eq!(state.metrics().pushes_dropped.get(&[("channel", BOTS_CHANNEL)]), 0);
}
