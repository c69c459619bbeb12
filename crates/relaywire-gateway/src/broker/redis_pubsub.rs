//! Redis pub/sub broker (feature `redis`).

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::task::JoinHandle;

use relaywire_core::error::{RelayError, Result};

use crate::broker::{Broker, BrokerCallback};

pub struct RedisBroker {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| RelayError::Internal(format!("redis url invalid: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RelayError::Internal(format!("redis connect failed: {e}")))?;
        tracing::info!(url, "redis broker connected");
        Ok(Self {
            client,
            conn,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, channel: &str, message: String) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, message)
            .await
            .map_err(|e| RelayError::BrokerPublish(e.to_string()))
    }

    async fn subscribe(&self, channel: &str, callback: BrokerCallback) -> Result<()> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| RelayError::Internal(format!("redis pubsub connect failed: {e}")))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| RelayError::Internal(format!("redis subscribe failed: {e}")))?;

        let channel = channel.to_string();
        let task = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<String>() {
                    Ok(payload) => callback(payload),
                    Err(e) => tracing::warn!(channel = %channel, error = %e, "non-utf8 broker message dropped"),
                }
            }
            tracing::debug!(channel = %channel, "redis subscription stream ended");
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if let Ok(mut tasks) = self.tasks.lock() {
            for t in tasks.drain(..) {
                t.abort();
            }
        }
        Ok(())
    }
}
