use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use relaywire_core::error::Result;
use relaywire_core::protocol::ipc::IpcCommand;

use crate::ipc::CommandHandler;
use crate::rpc::{RpcCtx, RpcMethod, Validate};

pub const PONG_TYPE_URL: &str = "type.relaywire/system.Pong";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PingInput {
    #[serde(default)]
    pub echo: Option<String>,
}

impl Validate for PingInput {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub pong: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
    pub server_time: DateTime<Utc>,
}

/// `system.ping`
#[derive(Default)]
pub struct Ping;

#[async_trait]
impl RpcMethod for Ping {
    type Input = PingInput;
    type Output = Pong;

    fn name(&self) -> &'static str {
        "system.ping"
    }

    fn result_type(&self) -> &'static str {
        PONG_TYPE_URL
    }

    async fn call(&self, _ctx: RpcCtx, input: PingInput) -> Result<Pong> {
        Ok(Pong {
            pong: true,
            echo: input.echo,
            server_time: Utc::now(),
        })
    }
}

/// Worker side of `PING`.
#[derive(Default)]
pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    fn kind(&self) -> &'static str {
        "PING"
    }

    async fn handle(&self, _cmd: &IpcCommand) -> Result<Map<String, Value>> {
        let mut body = Map::new();
        body.insert("ok".into(), json!(true));
        Ok(body)
    }
}
