//! Shared application state for the relaywire gateway.
//!
//! Everything is built once at startup: the type registry is populated and
//! then frozen behind an `Arc`, data sources and RPC methods are registered,
//! and the command bus (plus the optional in-process worker) is attached to
//! the broker in [`AppState::start`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::Duration;

use relaywire_core::error::Result;
use relaywire_core::protocol::any::TypeRegistry;

use crate::broker::Broker;
use crate::config::RelayConfig;
use crate::ipc::{CommandBus, CommandWorker};
use crate::obs::RelayMetrics;
use crate::rpc::{register_result_type, RpcDispatcher};
use crate::services::{
    BotAction, BotCommandHandler, BotControl, BotStatus, Ping, PingHandler, BOTS_CHANNEL,
    BOT_STATUS_TYPE_URL,
};
use crate::subscription::{
    ChangeSink, DataSource, MemoryTable, Record, SubscriptionEngine, SubscriptionHub, RECORD_TYPE_URL,
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: RelayConfig,
    types: Arc<TypeRegistry>,
    metrics: Arc<RelayMetrics>,
    engine: Arc<SubscriptionEngine>,
    dispatcher: Arc<RpcDispatcher>,
    broker: Arc<dyn Broker>,
    bus: Arc<CommandBus>,
    worker: Option<Arc<CommandWorker>>,
    bots: Arc<MemoryTable>,
    next_conn_id: AtomicU64,
}

impl AppState {
    pub fn new(cfg: RelayConfig, broker: Arc<dyn Broker>) -> Result<Self> {
        cfg.validate()?;
        let metrics = Arc::new(RelayMetrics::default());

        // 1) Type registry: frozen once built.
        let mut types = TypeRegistry::new();
        types.register::<Record>(RECORD_TYPE_URL);
        register_result_type(&mut types, &Ping);
        // BotControl needs the bus, so its result type is registered directly.
        types.register::<BotStatus>(BOT_STATUS_TYPE_URL);
        let types = Arc::new(types);

        // 2) Subscriptions
        let hub = Arc::new(SubscriptionHub::new(Arc::clone(&types), Arc::clone(&metrics)));
        let engine = Arc::new(SubscriptionEngine::new(
            Arc::clone(&hub),
            Arc::clone(&types),
            &cfg.subscriptions,
        ));
        let sink: Arc<dyn ChangeSink> = hub;
        let bots = Arc::new(MemoryTable::new(BOTS_CHANNEL, &["status", "owner"], Some(sink)));
        engine.register_source(Arc::clone(&bots) as Arc<dyn DataSource>);

        // 3) Command bus (+ worker when this process also executes commands)
        let bus = Arc::new(CommandBus::new(Arc::clone(&broker), &cfg.ipc, Arc::clone(&metrics)));
        let worker = cfg.worker.enabled.then(|| {
            let worker = CommandWorker::new(Arc::clone(&broker), &cfg.ipc);
            worker.register(Arc::new(PingHandler));
            worker.register(Arc::new(BotCommandHandler::new(BotAction::Start, Arc::clone(&bots))));
            worker.register(Arc::new(BotCommandHandler::new(BotAction::Stop, Arc::clone(&bots))));
            Arc::new(worker)
        });

        // 4) RPC methods
        let dispatcher = RpcDispatcher::new(Arc::clone(&types), Arc::clone(&metrics));
        dispatcher.register(Ping);
        dispatcher.register(BotControl::new(BotAction::Start, Arc::clone(&bus), Arc::clone(&bots)));
        dispatcher.register(BotControl::new(BotAction::Stop, Arc::clone(&bus), Arc::clone(&bots)));

        tracing::info!(
            channels = ?engine.channels(),
            methods = ?dispatcher.registered_methods(),
            worker = worker.is_some(),
            "gateway state built"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                types,
                metrics,
                engine,
                dispatcher: Arc::new(dispatcher),
                broker,
                bus,
                worker,
                bots,
                next_conn_id: AtomicU64::new(1),
            }),
        })
    }

    /// Attach bus and worker to the broker.
    pub async fn start(&self) -> Result<()> {
        self.inner.bus.start().await?;
        if let Some(worker) = &self.inner.worker {
            worker.start().await?;
        }
        Ok(())
    }

    /// Drain worker tasks for at most `grace`, then fail pending commands and
    /// close the broker.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        if let Some(worker) = &self.inner.worker {
            if !worker.drain(grace).await {
                tracing::warn!(in_flight = worker.in_flight(), "grace period over, abandoning commands");
            }
        }
        let abandoned = self.inner.bus.abandon_all();
        if abandoned > 0 {
            tracing::warn!(abandoned, "pending commands abandoned");
        }
        self.inner.broker.shutdown().await
    }

    pub fn cfg(&self) -> &RelayConfig {
        &self.inner.cfg
    }

    pub fn types(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.inner.types)
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.inner.metrics
    }

    pub fn engine(&self) -> &SubscriptionEngine {
        &self.inner.engine
    }

    pub fn dispatcher(&self) -> Arc<RpcDispatcher> {
        Arc::clone(&self.inner.dispatcher)
    }

    pub fn bus(&self) -> Arc<CommandBus> {
        Arc::clone(&self.inner.bus)
    }

    pub fn bots(&self) -> Arc<MemoryTable> {
        Arc::clone(&self.inner.bots)
    }

    pub fn next_conn_id(&self) -> u64 {
        self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}
