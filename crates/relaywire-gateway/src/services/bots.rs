//! Bot control.
//!
//! `bots.start` / `bots.stop` ask a worker process to act through the command
//! bus. When the worker does not answer within the budget the gateway applies
//! the status change to the `bots` table itself and reports `via: fallback`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::ipc::{remote_result, IpcCommand};
use relaywire_core::FieldIssue;

use crate::ipc::{CommandBus, CommandHandler};
use crate::rpc::{require_non_empty, RpcCtx, RpcMethod, Validate};
use crate::subscription::MemoryTable;

pub const BOTS_CHANNEL: &str = "bots";
pub const BOT_STATUS_TYPE_URL: &str = "type.relaywire/bots.BotStatus";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotAction {
    Start,
    Stop,
}

impl BotAction {
    pub fn method(self) -> &'static str {
        match self {
            BotAction::Start => "bots.start",
            BotAction::Stop => "bots.stop",
        }
    }

    pub fn command(self) -> &'static str {
        match self {
            BotAction::Start => "START_BOT",
            BotAction::Stop => "STOP_BOT",
        }
    }

    /// Status a bot ends up in after this action.
    pub fn status(self) -> &'static str {
        match self {
            BotAction::Start => "running",
            BotAction::Stop => "stopped",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BotInput {
    pub bot_id: String,
}

impl Validate for BotInput {
    fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        require_non_empty(&mut issues, "botId", &self.bot_id);
        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotVia {
    Worker,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub bot_id: String,
    pub status: String,
    pub via: BotVia,
}

fn bot_not_found(bot_id: &str) -> RelayError {
    RelayError::domain("BOT_NOT_FOUND", format!("unknown bot: {bot_id}"))
}

fn set_status(bots: &MemoryTable, bot_id: &str, status: &str) -> Result<()> {
    let mut fields = Map::new();
    fields.insert("status".into(), json!(status));
    bots.patch(bot_id, fields)
        .map(|_| ())
        .ok_or_else(|| bot_not_found(bot_id))
}

/// RPC side of bot control.
pub struct BotControl {
    action: BotAction,
    bus: Arc<CommandBus>,
    bots: Arc<MemoryTable>,
}

impl BotControl {
    pub fn new(action: BotAction, bus: Arc<CommandBus>, bots: Arc<MemoryTable>) -> Self {
        Self { action, bus, bots }
    }
}

#[async_trait]
impl RpcMethod for BotControl {
    type Input = BotInput;
    type Output = BotStatus;

    fn name(&self) -> &'static str {
        self.action.method()
    }

    fn result_type(&self) -> &'static str {
        BOT_STATUS_TYPE_URL
    }

    async fn call(&self, ctx: RpcCtx, input: BotInput) -> Result<BotStatus> {
        if self.bots.get(&input.bot_id).is_none() {
            return Err(bot_not_found(&input.bot_id));
        }

        let cmd = IpcCommand::new(self.action.command()).with_field("botId", input.bot_id.clone());
        match self.bus.send(cmd).await.and_then(remote_result) {
            Ok(body) => {
                let status = body
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or(self.action.status())
                    .to_string();
                Ok(BotStatus {
                    bot_id: input.bot_id,
                    status,
                    via: BotVia::Worker,
                })
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(
                    conn = ctx.conn_id(),
                    request = ctx.request_id(),
                    bot = %input.bot_id,
                    "worker did not answer, applying {} locally",
                    self.action.command()
                );
                set_status(&self.bots, &input.bot_id, self.action.status())?;
                Ok(BotStatus {
                    bot_id: input.bot_id,
                    status: self.action.status().to_string(),
                    via: BotVia::Fallback,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Worker side of `START_BOT` / `STOP_BOT`.
pub struct BotCommandHandler {
    action: BotAction,
    bots: Arc<MemoryTable>,
}

impl BotCommandHandler {
    pub fn new(action: BotAction, bots: Arc<MemoryTable>) -> Self {
        Self { action, bots }
    }
}

#[async_trait]
impl CommandHandler for BotCommandHandler {
    fn kind(&self) -> &'static str {
        self.action.command()
    }

    async fn handle(&self, cmd: &IpcCommand) -> Result<Map<String, Value>> {
        let bot_id = cmd
            .fields
            .get("botId")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::BadRequest(format!("{} requires botId", cmd.kind)))?;
        set_status(&self.bots, bot_id, self.action.status())?;

        let mut body = Map::new();
        body.insert("botId".into(), json!(bot_id));
        body.insert("status".into(), json!(self.action.status()));
        Ok(body)
    }
}

/// Rows the demo gateway boots with.
pub fn seed_demo_bots(bots: &MemoryTable) {
    for (id, owner) in [("bot-1", "alice"), ("bot-2", "alice"), ("bot-3", "bob")] {
        bots.upsert(id, json!({ "name": id, "owner": owner, "status": "stopped" }));
    }
}
