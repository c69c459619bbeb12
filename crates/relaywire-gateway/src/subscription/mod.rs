//! Reactive subscriptions: snapshot, incremental updates, and cursor paging.
//!
//! A subscription lives on one connection and goes `Active -> Closed`. The
//! engine computes the snapshot through a [`DataSource`]; the hub fans change
//! events from the data layer out to listeners as update items.

pub mod engine;
pub mod hub;
pub mod memory;
pub mod source;

pub use engine::{FetchMoreRequest, SubscribeRequest, SubscriptionEngine};
pub use hub::{Listener, SubscriptionHub, SubscriptionQuery};
pub use memory::MemoryTable;
pub use source::{ChangeEvent, ChangeSink, DataSource, Record, RECORD_TYPE_URL};
