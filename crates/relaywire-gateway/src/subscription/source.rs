//! Data-layer seam consumed by the subscription engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use relaywire_core::error::Result;
use relaywire_core::protocol::cursor::Pagination;
use relaywire_core::protocol::filters::Filters;

/// Registered `Any` identifier for [`Record`].
pub const RECORD_TYPE_URL: &str = "type.relaywire/Record";

/// One row as the protocol sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    /// Sort key; ties are broken by `id`.
    pub created_at: DateTime<Utc>,
    pub version: i64,
    pub data: Value,
}

/// A watched record changed upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Upsert(Record),
    Delete { id: String },
}

impl ChangeEvent {
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Upsert(r) => &r.id,
            ChangeEvent::Delete { id } => id,
        }
    }
}

/// Paginated, filterable read access to one channel's rows.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn channel(&self) -> &str;

    /// Fields the source can filter on. Other filter keys are not honored.
    fn filterable_fields(&self) -> &[String];

    /// Rows strictly after `page.after` in `page.direction`, at most `page.limit`.
    async fn fetch_page(&self, page: &Pagination, filters: &Filters) -> Result<Vec<Record>>;

    async fn count(&self, filters: &Filters) -> Result<u64>;
}

/// Receiver of upstream change events, keyed by channel.
pub trait ChangeSink: Send + Sync {
    fn publish(&self, channel: &str, event: ChangeEvent);
}
