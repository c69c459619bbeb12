#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::any::TypeRegistry;
use relaywire_core::protocol::rpc::{RpcPayload, RpcRequest};
use relaywire_core::FieldIssue;
use relaywire_gateway::obs::RelayMetrics;
use relaywire_gateway::rpc::{register_result_type, require_non_empty, RpcCtx, RpcDispatcher, RpcMethod, Validate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RenameInput {
    bot_id: String,
    name: String,
}

impl Validate for RenameInput {
    fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        require_non_empty(&mut issues, "botId", &self.bot_id);
        require_non_empty(&mut issues, "name", &self.name);
        issues
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Renamed {
    bot_id: String,
    name: String,
}

/// Counts invocations so tests can assert the handler never ran.
struct RenameSpy {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl RpcMethod for RenameSpy {
    type Input = RenameInput;
    type Output = Renamed;

    fn name(&self) -> &'static str {
        "bots.rename"
    }

    fn result_type(&self) -> &'static str {
        "type.test/Renamed"
    }

    async fn call(&self, _ctx: RpcCtx, input: RenameInput) -> Result<Renamed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if input.bot_id == "ghost" {
            return Err(RelayError::domain("BOT_NOT_FOUND", "unknown bot: ghost"));
        }
        if input.bot_id == "boom" {
            return Err(RelayError::Internal("storage unavailable".into()));
        }
        Ok(Renamed {
            bot_id: input.bot_id,
            name: input.name,
        })
    }
}

fn setup() -> (RpcDispatcher, Arc<TypeRegistry>, Arc<AtomicUsize>, Arc<RelayMetrics>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let spy = RenameSpy {
        calls: Arc::clone(&calls),
    };
    let mut types = TypeRegistry::new();
    register_result_type(&mut types, &spy);
    let types = Arc::new(types);
    let metrics = Arc::new(RelayMetrics::default());
    let dispatcher = RpcDispatcher::new(Arc::clone(&types), Arc::clone(&metrics));
    dispatcher.register(spy);
    (dispatcher, types, calls, metrics)
}

fn request(method: &str, data: serde_json::Value) -> RpcRequest {
    RpcRequest {
        id: "req-1".into(),
        method: method.into(),
        data,
    }
}

fn ctx() -> RpcCtx {
    RpcCtx::new(7, "req-1")
}

#[tokio::test]
async fn unknown_method_is_not_found_and_invokes_nothing() {
    let (dispatcher, _, calls, metrics) = setup();
    let reply = dispatcher.dispatch(ctx(), request("bots.explode", json!({}))).await;

    assert_eq!(reply.error_code(), Some("METHOD_NOT_FOUND"));
    assert_eq!(reply.method(), "bots.explode");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.rpc_calls.get(&[("method", "unknown"), ("status", "error")]), 1);
}

#[tokio::test]
async fn validation_failure_reports_fields_without_calling_handler() {
    let (dispatcher, _, calls, _) = setup();
    let reply = dispatcher
        .dispatch(ctx(), request("bots.rename", json!({"botId": "", "name": " "})))
        .await;

    match reply {
        RpcPayload::Error {
            error_code, details, ..
        } => {
            assert_eq!(error_code, "VALIDATION_ERROR");
            let issues: Vec<FieldIssue> = serde_json::from_value(details.unwrap()).unwrap();
            let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
            assert_eq!(paths, vec!["botId", "name"]);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn shape_errors_are_validation_errors_too() {
    let (dispatcher, _, calls, _) = setup();
    let reply = dispatcher
        .dispatch(ctx(), request("bots.rename", json!({"botId": "b1"})))
        .await;
    assert_eq!(reply.error_code(), Some("VALIDATION_ERROR"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn success_packs_result_under_its_type() {
    let (dispatcher, types, calls, metrics) = setup();
    let reply = dispatcher
        .dispatch(ctx(), request("bots.rename", json!({"botId": "b1", "name": "Scout"})))
        .await;

    let RpcPayload::Ok { method, data } = reply else {
        panic!("expected ok");
    };
    assert_eq!(method, "bots.rename");
    let env = data.unwrap();
    assert_eq!(env.type_url, "type.test/Renamed");
    let out: Renamed = types.unpack(&env, None).unwrap();
    assert_eq!(
        out,
        Renamed {
            bot_id: "b1".into(),
            name: "Scout".into()
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.rpc_calls.get(&[("method", "bots.rename"), ("status", "ok")]), 1);
}

#[tokio::test]
async fn domain_error_keeps_its_code() {
    let (dispatcher, _, _, _) = setup();
    let reply = dispatcher
        .dispatch(ctx(), request("bots.rename", json!({"botId": "ghost", "name": "x"})))
        .await;
    match reply {
        RpcPayload::Error {
            error_code,
            error_message,
            ..
        } => {
            assert_eq!(error_code, "BOT_NOT_FOUND");
            assert_eq!(error_message, "unknown bot: ghost");
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn other_failures_are_internal_server_errors() {
    let (dispatcher, _, _, _) = setup();
    let reply = dispatcher
        .dispatch(ctx(), request("bots.rename", json!({"botId": "boom", "name": "x"})))
        .await;
    assert_eq!(reply.error_code(), Some("INTERNAL_SERVER_ERROR"));
    assert!(!reply.is_ok());
}

#[tokio::test]
async fn reply_wire_shape() {
    let (dispatcher, _, _, _) = setup();
    let reply = dispatcher.dispatch(ctx(), request("nope", json!(null))).await;
    let v = serde_json::to_value(&reply).unwrap();
    assert_eq!(v["status"], "error");
    assert_eq!(v["errorCode"], "METHOD_NOT_FOUND");
    assert_eq!(v["method"], "nope");
}
