use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use relaywire_core::error::{RelayError, Result};

use crate::broker::{Broker, BrokerCallback};

/// In-process broker for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryBroker {
    subscribers: DashMap<String, Vec<BrokerCallback>>,
    closed: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.subscribers.clear();
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, channel: &str, message: String) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(RelayError::BrokerPublish("broker closed".into()));
        }
        // Clone out so callbacks may subscribe/publish without deadlocking the shard.
        let callbacks = match self.subscribers.get(channel) {
            Some(cbs) => cbs.value().clone(),
            None => return Ok(()),
        };
        for cb in callbacks {
            cb(message.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str, callback: BrokerCallback) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(RelayError::Internal("broker closed".into()));
        }
        self.subscribers
            .entry(channel.to_string())
            .or_default()
            .push(callback);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.close();
        Ok(())
    }
}
