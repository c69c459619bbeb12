//! Shared pub/sub broker used for cross-process commands.
//!
//! Delivery is at-most-once and fire-and-forget: a message published while
//! nobody is subscribed is gone. Callbacks run on the broker's delivery path
//! and must not block; spawn if there is real work to do.

use std::sync::Arc;

use async_trait::async_trait;

use relaywire_core::error::Result;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_pubsub;

pub use memory::MemoryBroker;
#[cfg(feature = "redis")]
pub use redis_pubsub::RedisBroker;

/// Invoked once per message delivered on a subscribed channel.
pub type BrokerCallback = Arc<dyn Fn(String) + Send + Sync>;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Resolves once the broker accepted the message.
    async fn publish(&self, channel: &str, message: String) -> Result<()>;

    async fn subscribe(&self, channel: &str, callback: BrokerCallback) -> Result<()>;

    /// Stop delivering; later publishes fail.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
