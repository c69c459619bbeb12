use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::Notify;
use tokio::time::{timeout, Duration};

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::ipc::{IpcCommand, IpcResponse};

use crate::broker::Broker;
use crate::config::IpcSection;
use crate::obs::{Log, Prefixed, TracingLog};

/// Worker-side handler for one command `type`.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn kind(&self) -> &'static str;
    async fn handle(&self, cmd: &IpcCommand) -> Result<Map<String, Value>>;
}

/// Consumes commands from the broker and publishes correlated replies.
pub struct CommandWorker {
    broker: Arc<dyn Broker>,
    handlers: DashMap<&'static str, Arc<dyn CommandHandler>>,
    command_channel: String,
    response_channel: String,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
    log: Prefixed<TracingLog>,
}

impl CommandWorker {
    pub fn new(broker: Arc<dyn Broker>, cfg: &IpcSection) -> Self {
        Self {
            broker,
            handlers: DashMap::new(),
            command_channel: cfg.command_channel.clone(),
            response_channel: cfg.response_channel.clone(),
            accepting: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            log: Prefixed::new("ipc-worker", TracingLog),
        }
    }

    pub fn register(&self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn registered_kinds(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| *e.key()).collect()
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let worker = Arc::downgrade(self);
        self.broker
            .subscribe(
                &self.command_channel,
                Arc::new(move |raw: String| {
                    if let Some(worker) = worker.upgrade() {
                        worker.accept(raw);
                    }
                }),
            )
            .await?;
        self.log
            .info(&format!("consuming commands on {}", self.command_channel));
        Ok(())
    }

    fn accept(self: &Arc<Self>, raw: String) {
        if !self.accepting.load(Ordering::SeqCst) {
            self.log.debug("draining, command ignored");
            return;
        }
        let cmd: IpcCommand = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                self.log.warn(&format!("malformed command dropped: {e}"));
                return;
            }
        };
        let Some(correlation_id) = cmd.correlation_id.clone() else {
            self.log
                .warn(&format!("{} without correlationId dropped", cmd.kind));
            return;
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            worker.run(correlation_id, cmd).await;
            if worker.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                worker.idle.notify_waiters();
            }
        });
    }

    async fn run(&self, correlation_id: String, cmd: IpcCommand) {
        let handler = self.handlers.get(cmd.kind.as_str()).map(|h| Arc::clone(h.value()));
        let resp = match handler {
            None => IpcResponse::failure(
                correlation_id,
                &RelayError::domain("UNKNOWN_COMMAND", format!("no handler for {}", cmd.kind)),
            ),
            Some(h) => match h.handle(&cmd).await {
                Ok(mut fields) => {
                    fields.remove("correlationId");
                    IpcResponse {
                        correlation_id,
                        fields,
                    }
                }
                Err(e) => {
                    self.log.warn(&format!("{} failed: {e}", cmd.kind));
                    IpcResponse::failure(correlation_id, &e)
                }
            },
        };

        let raw = match serde_json::to_string(&resp) {
            Ok(s) => s,
            Err(e) => {
                self.log.error(&format!("reply encode failed: {e}"));
                return;
            }
        };
        if let Err(e) = self.broker.publish(&self.response_channel, raw).await {
            self.log.error(&format!(
                "reply publish failed (correlationId={}): {e}",
                resp.correlation_id
            ));
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting and wait up to `grace` for in-flight commands.
    /// Returns false if work was still running when the grace period ended.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.accepting.store(false, Ordering::SeqCst);
        let wait_idle = async {
            loop {
                let notified = self.idle.notified();
                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };
        timeout(grace, wait_idle).await.is_ok()
    }
}
