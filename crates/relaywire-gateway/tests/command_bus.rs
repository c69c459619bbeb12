#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::time::{Duration, Instant};

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::ipc::{remote_result, IpcCommand, IpcResponse};
use relaywire_gateway::broker::{Broker, MemoryBroker};
use relaywire_gateway::config::IpcSection;
use relaywire_gateway::ipc::{CommandBus, CommandHandler, CommandWorker};
use relaywire_gateway::obs::RelayMetrics;

fn ipc() -> IpcSection {
    IpcSection::default()
}

async fn bus_on(broker: Arc<MemoryBroker>) -> (Arc<CommandBus>, Arc<RelayMetrics>) {
    let metrics = Arc::new(RelayMetrics::default());
    let bus = Arc::new(CommandBus::new(broker, &ipc(), Arc::clone(&metrics)));
    bus.start().await.unwrap();
    (bus, metrics)
}

/// Captures raw commands published on the command channel.
async fn tap_commands(broker: &MemoryBroker) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    broker
        .subscribe(
            &ipc().command_channel,
            Arc::new(move |raw: String| sink.lock().unwrap().push(raw)),
        )
        .await
        .unwrap();
    seen
}

#[tokio::test(start_paused = true)]
async fn ping_resolves_with_reply_body() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, metrics) = bus_on(Arc::clone(&broker)).await;

    // Responder: answers every command on the response channel.
    let responder = Arc::clone(&broker);
    broker
        .subscribe(
            &ipc().command_channel,
            Arc::new(move |raw: String| {
                let cmd: IpcCommand = serde_json::from_str(&raw).unwrap();
                let reply = IpcResponse::new(cmd.correlation_id.unwrap()).with_field("ok", true);
                let broker = Arc::clone(&responder);
                tokio::spawn(async move {
                    broker
                        .publish(&ipc().response_channel, serde_json::to_string(&reply).unwrap())
                        .await
                        .unwrap();
                });
            }),
        )
        .await
        .unwrap();

    let cmd = IpcCommand::new("PING").with_correlation_id("abc");
    let body = bus.send_command(cmd, Duration::from_millis(1000)).await.unwrap();

    assert_eq!(body.get("ok"), Some(&json!(true)));
    assert_eq!(bus.pending_len(), 0);
    assert_eq!(metrics.ipc_commands.get(&[("kind", "PING"), ("outcome", "resolved")]), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_reply_times_out_after_exactly_the_budget() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, metrics) = bus_on(Arc::clone(&broker)).await;
    let published = tap_commands(&broker).await;

    let started = Instant::now();
    let err = bus
        .send_command(IpcCommand::new("START_BOT").with_field("botId", "b1"), Duration::from_millis(500))
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_millis(500));
    match err {
        RelayError::Timeout { method, budget_ms } => {
            assert_eq!(method, "START_BOT");
            assert_eq!(budget_ms, 500);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(bus.pending_len(), 0);
    assert_eq!(metrics.ipc_commands.get(&[("kind", "START_BOT"), ("outcome", "timeout")]), 1);

    // The command still went out, with a generated correlation id.
    let raw = published.lock().unwrap().clone();
    assert_eq!(raw.len(), 1);
    let cmd: IpcCommand = serde_json::from_str(&raw[0]).unwrap();
    assert!(!cmd.correlation_id.unwrap().is_empty());
    assert_eq!(cmd.fields.get("botId"), Some(&json!("b1")));
}

#[tokio::test(start_paused = true)]
async fn late_reply_after_timeout_is_dropped() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, _) = bus_on(Arc::clone(&broker)).await;

    let cmd = IpcCommand::new("PING").with_correlation_id("late");
    let err = bus.send_command(cmd, Duration::from_millis(100)).await.unwrap_err();
    assert!(err.is_timeout());

    let reply = IpcResponse::new("late").with_field("ok", true);
    assert!(!bus.on_response(&serde_json::to_string(&reply).unwrap()));
    assert_eq!(bus.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn publish_failure_clears_pending_entry() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, metrics) = bus_on(Arc::clone(&broker)).await;
    broker.close();

    let err = bus
        .send_command(IpcCommand::new("PING").with_correlation_id("x"), Duration::from_millis(100))
        .await
        .unwrap_err();

    assert_eq!(err.wire_code(), "BROKER_PUBLISH_FAILED");
    assert!(!bus.is_pending("x"));
    assert_eq!(metrics.ipc_commands.get(&[("kind", "PING"), ("outcome", "publish_failed")]), 1);
}

#[tokio::test(start_paused = true)]
async fn unmatched_and_malformed_replies_are_ignored() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, _) = bus_on(Arc::clone(&broker)).await;

    let stray = IpcResponse::new("nobody-asked").with_field("ok", true);
    broker
        .publish(&ipc().response_channel, serde_json::to_string(&stray).unwrap())
        .await
        .unwrap();
    assert!(!bus.on_response("{not json"));
    assert_eq!(bus.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_pending_correlation_id_is_rejected() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, _) = bus_on(Arc::clone(&broker)).await;

    let first = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            bus.send_command(IpcCommand::new("PING").with_correlation_id("dup"), Duration::from_millis(200))
                .await
        })
    };
    tokio::task::yield_now().await;
    assert!(bus.is_pending("dup"));

    let err = bus
        .send_command(IpcCommand::new("PING").with_correlation_id("dup"), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err.wire_code(), "BAD_REQUEST");

    assert!(first.await.unwrap().unwrap_err().is_timeout());
}

#[tokio::test(start_paused = true)]
async fn cancelled_caller_releases_its_correlation_id() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, _) = bus_on(Arc::clone(&broker)).await;

    let waiting = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            bus.send_command(IpcCommand::new("PING").with_correlation_id("c1"), Duration::from_millis(500))
                .await
        })
    };
    tokio::task::yield_now().await;
    assert!(bus.is_pending("c1"));

    waiting.abort();
    assert!(waiting.await.unwrap_err().is_cancelled());
    assert_eq!(bus.pending_len(), 0);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(bus.pending_len(), 0);

    // The id is free again.
    let reply = IpcResponse::new("c1").with_field("ok", true);
    assert!(!bus.on_response(&serde_json::to_string(&reply).unwrap()));
}

#[tokio::test(start_paused = true)]
async fn outer_timeout_around_send_does_not_leak() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, _) = bus_on(Arc::clone(&broker)).await;

    let outer = tokio::time::timeout(
        Duration::from_millis(50),
        bus.send_command(IpcCommand::new("PING"), Duration::from_secs(5)),
    )
    .await;
    assert!(outer.is_err());
    assert_eq!(bus.pending_len(), 0);
}

struct Upper;

#[async_trait]
impl CommandHandler for Upper {
    fn kind(&self) -> &'static str {
        "UPPER"
    }

    async fn handle(&self, cmd: &IpcCommand) -> Result<Map<String, Value>> {
        let text = cmd
            .fields
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::domain("MISSING_TEXT", "text is required"))?;
        let mut body = Map::new();
        body.insert("text".into(), json!(text.to_uppercase()));
        Ok(body)
    }
}

async fn worker_on(broker: Arc<MemoryBroker>) -> Arc<CommandWorker> {
    let worker = Arc::new(CommandWorker::new(broker, &ipc()));
    worker.register(Arc::new(Upper));
    worker.start().await.unwrap();
    worker
}

#[tokio::test(start_paused = true)]
async fn worker_round_trip() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, _) = bus_on(Arc::clone(&broker)).await;
    let worker = worker_on(Arc::clone(&broker)).await;

    let body = bus
        .send_command(IpcCommand::new("UPPER").with_field("text", "relay"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(body.get("text"), Some(&json!("RELAY")));
    assert!(!body.contains_key("correlationId"));
    assert!(worker.drain(Duration::from_millis(10)).await);
}

#[tokio::test(start_paused = true)]
async fn worker_failures_come_back_as_remote_errors() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, _) = bus_on(Arc::clone(&broker)).await;
    let _worker = worker_on(Arc::clone(&broker)).await;

    let body = bus
        .send_command(IpcCommand::new("UPPER"), Duration::from_secs(1))
        .await
        .unwrap();
    let err = remote_result(body).unwrap_err();
    assert_eq!(err.wire_code(), "MISSING_TEXT");

    let body = bus
        .send_command(IpcCommand::new("SHRUG"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(remote_result(body).unwrap_err().wire_code(), "UNKNOWN_COMMAND");
}

struct Slow;

#[async_trait]
impl CommandHandler for Slow {
    fn kind(&self) -> &'static str {
        "SLOW"
    }

    async fn handle(&self, _cmd: &IpcCommand) -> Result<Map<String, Value>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Map::new())
    }
}

#[tokio::test(start_paused = true)]
async fn drain_is_bounded_by_grace() {
    let broker = Arc::new(MemoryBroker::new());
    let (bus, _) = bus_on(Arc::clone(&broker)).await;
    let worker = Arc::new(CommandWorker::new(Arc::clone(&broker) as Arc<dyn Broker>, &ipc()));
    worker.register(Arc::new(Slow));
    worker.start().await.unwrap();

    let pending = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move { bus.send_command(IpcCommand::new("SLOW"), Duration::from_secs(60)).await })
    };
    tokio::task::yield_now().await;
    assert_eq!(worker.in_flight(), 1);

    let started = Instant::now();
    assert!(!worker.drain(Duration::from_secs(2)).await);
    assert_eq!(started.elapsed(), Duration::from_secs(2));

    // Draining stops new work from being picked up.
    let err = bus
        .send_command(IpcCommand::new("SLOW"), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(worker.in_flight(), 1);

    assert!(pending.await.unwrap().is_ok());
}
