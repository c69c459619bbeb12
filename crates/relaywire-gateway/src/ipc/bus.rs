use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::ipc::{IpcCommand, IpcResponse};

use crate::broker::Broker;
use crate::config::IpcSection;
use crate::obs::{Log, Prefixed, RelayMetrics, TracingLog};

type Resolver = oneshot::Sender<Map<String, Value>>;

/// Client side of the distributed command bus.
///
/// A correlation id is consumed by exactly one of {matching reply, timeout,
/// cancelled caller} and is removed from the pending map in every case.
pub struct CommandBus {
    broker: Arc<dyn Broker>,
    pending: DashMap<String, Resolver>,
    command_channel: String,
    response_channel: String,
    default_budget: Duration,
    metrics: Arc<RelayMetrics>,
    log: Prefixed<TracingLog>,
    started: AtomicBool,
}

impl CommandBus {
    pub fn new(broker: Arc<dyn Broker>, cfg: &IpcSection, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            broker,
            pending: DashMap::new(),
            command_channel: cfg.command_channel.clone(),
            response_channel: cfg.response_channel.clone(),
            default_budget: Duration::from_millis(cfg.timeout_ms),
            metrics,
            log: Prefixed::new("ipc-bus", TracingLog),
            started: AtomicBool::new(false),
        }
    }

    /// Subscribe to the response channel. Idempotent.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let bus = Arc::downgrade(self);
        self.broker
            .subscribe(
                &self.response_channel,
                Arc::new(move |raw: String| {
                    if let Some(bus) = bus.upgrade() {
                        bus.on_response(&raw);
                    }
                }),
            )
            .await?;
        self.log
            .info(&format!("listening for replies on {}", self.response_channel));
        Ok(())
    }

    /// Route one raw reply to its waiter. Returns whether it matched.
    pub fn on_response(&self, raw: &str) -> bool {
        let resp: IpcResponse = match serde_json::from_str(raw) {
            Ok(r) => r,
            Err(e) => {
                self.log.warn(&format!("malformed reply dropped: {e}"));
                return false;
            }
        };
        match self.pending.remove(&resp.correlation_id) {
            Some((_, resolver)) => {
                // The waiter may have been cancelled; nothing else to do then.
                let _ = resolver.send(resp.fields);
                true
            }
            None => {
                self.log.warn(&format!(
                    "unmatched reply dropped (correlationId={})",
                    resp.correlation_id
                ));
                false
            }
        }
    }

    pub async fn send(&self, cmd: IpcCommand) -> Result<Map<String, Value>> {
        self.send_command(cmd, self.default_budget).await
    }

    /// Publish `cmd` and wait up to `budget` for the correlated reply body.
    ///
    /// `RelayError::Timeout` means no reply arrived in time; callers use it to
    /// pick a local recovery path.
    pub async fn send_command(&self, mut cmd: IpcCommand, budget: Duration) -> Result<Map<String, Value>> {
        let correlation_id = cmd
            .correlation_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let kind = cmd.kind.clone();
        let raw = serde_json::to_string(&cmd)
            .map_err(|e| RelayError::Internal(format!("command encode failed: {e}")))?;

        let (tx, mut rx) = oneshot::channel();
        match self.pending.entry(correlation_id.clone()) {
            Entry::Occupied(_) => {
                return Err(RelayError::BadRequest(format!(
                    "correlation id already pending: {correlation_id}"
                )))
            }
            Entry::Vacant(v) => {
                v.insert(tx);
            }
        }
        // Removes the entry if this future is dropped before it settles.
        let guard = PendingGuard::new(&self.pending, correlation_id.clone());

        if let Err(e) = self.broker.publish(&self.command_channel, raw).await {
            guard.release();
            self.metrics
                .ipc_commands
                .inc(&[("kind", kind.as_str()), ("outcome", "publish_failed")]);
            self.log
                .error(&format!("publish {kind} failed (correlationId={correlation_id}): {e}"));
            return Err(match e {
                RelayError::BrokerPublish(_) => e,
                other => RelayError::BrokerPublish(other.to_string()),
            });
        }

        match timeout(budget, &mut rx).await {
            Ok(Ok(body)) => {
                // on_response already took the entry.
                guard.disarm();
                self.metrics
                    .ipc_commands
                    .inc(&[("kind", kind.as_str()), ("outcome", "resolved")]);
                Ok(body)
            }
            Ok(Err(_)) => {
                guard.disarm();
                Err(RelayError::Internal(format!("command {kind} abandoned")))
            }
            Err(_) => {
                if !guard.release() {
                    // The reply claimed the entry just as the timer fired.
                    if let Ok(body) = rx.try_recv() {
                        return Ok(body);
                    }
                }
                self.metrics
                    .ipc_commands
                    .inc(&[("kind", kind.as_str()), ("outcome", "timeout")]);
                self.log.warn(&format!(
                    "{kind} timed out after {}ms (correlationId={correlation_id})",
                    budget.as_millis()
                ));
                Err(RelayError::Timeout {
                    method: kind,
                    budget_ms: budget.as_millis() as u64,
                })
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Fail every waiter; used on shutdown.
    pub fn abandon_all(&self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}

/// Owns one pending entry for the lifetime of a `send_command` call.
struct PendingGuard<'a> {
    pending: &'a DashMap<String, Resolver>,
    id: String,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(pending: &'a DashMap<String, Resolver>, id: String) -> Self {
        Self {
            pending,
            id,
            armed: true,
        }
    }

    /// Remove the entry now. Returns whether it was still there.
    fn release(mut self) -> bool {
        self.armed = false;
        self.pending.remove(&self.id).is_some()
    }

    /// The entry is already gone; leave the map alone.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.remove(&self.id);
        }
    }
}
