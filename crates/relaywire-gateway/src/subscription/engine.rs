use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use tracing::debug;

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::any::{AnyEnvelope, TypeRegistry};
use relaywire_core::protocol::cursor::{Cursor, CursorPosition, Pagination, SortDirection};
use relaywire_core::protocol::filters::{filters_to_wire, Filters, WireFilters};
use relaywire_core::protocol::hybrid::Event;
use relaywire_core::protocol::update::{CursorPage, SnapshotPayload};

use crate::config::SubscriptionSection;
use crate::realtime::{Connection, OutFrame, QoS};
use crate::subscription::hub::{Listener, SubscriptionHub, SubscriptionQuery};
use crate::subscription::source::DataSource;

/// Payload of a `subscribe` frame.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Payload of a `fetchMore` frame: the last `nextCursor` the client received.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FetchMoreRequest {
    pub cursor: String,
}

/// Snapshot / fetchMore engine over registered data sources.
pub struct SubscriptionEngine {
    sources: DashMap<String, Arc<dyn DataSource>>,
    hub: Arc<SubscriptionHub>,
    types: Arc<TypeRegistry>,
    page_size: usize,
    max_page_size: usize,
}

impl SubscriptionEngine {
    pub fn new(hub: Arc<SubscriptionHub>, types: Arc<TypeRegistry>, cfg: &SubscriptionSection) -> Self {
        Self {
            sources: DashMap::new(),
            hub,
            types,
            page_size: cfg.page_size,
            max_page_size: cfg.max_page_size,
        }
    }

    pub fn register_source(&self, source: Arc<dyn DataSource>) {
        self.sources.insert(source.channel().to_string(), source);
    }

    pub fn channels(&self) -> Vec<String> {
        self.sources.iter().map(|e| e.key().clone()).collect()
    }

    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    fn source(&self, channel: &str) -> Result<Arc<dyn DataSource>> {
        self.sources
            .get(channel)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| RelayError::BadRequest(format!("unknown channel: {channel}")))
    }

    /// Push the first page, then start delivering updates for `channel`.
    ///
    /// The snapshot is queued before the listener is registered, so a client
    /// never sees an update ahead of its snapshot.
    pub async fn subscribe(
        &self,
        conn: &Connection,
        sub_id: Option<String>,
        channel: &str,
        req: SubscribeRequest,
    ) -> Result<()> {
        let source = self.source(channel)?;
        let (filters, applied) = honor_filters(source.filterable_fields(), req.filters);
        let query = SubscriptionQuery {
            limit: req.limit.unwrap_or(self.page_size).clamp(1, self.max_page_size),
            direction: req.direction,
        };

        let (page, ids) = self.load_page(source.as_ref(), query, &filters, None).await?;
        let listener = Arc::new(Listener::new(
            conn.clone(),
            sub_id,
            channel,
            filters,
            applied.clone(),
            query,
        ));
        listener.mark_seen(ids);

        let frame = OutFrame::new(
            listener.header(Event::Snapshot),
            &SnapshotPayload {
                data: page,
                applied_filters: applied,
            },
        )?;
        conn.send(&frame, QoS::Reliable { timeout_ms: 0 }).await?;

        if self.hub.insert(listener).is_some() {
            debug!(conn = conn.id(), channel, "subscription replaced");
        }
        Ok(())
    }

    /// Next page after `req.cursor` for an open subscription.
    pub async fn fetch_more(&self, conn: &Connection, channel: &str, req: FetchMoreRequest) -> Result<()> {
        let listener = self
            .hub
            .get(channel, conn.id())
            .ok_or_else(|| RelayError::BadRequest(format!("not subscribed to channel: {channel}")))?;
        let after = Cursor::decode(&req.cursor)?.position()?;
        let source = self.source(channel)?;

        let (page, ids) = self
            .load_page(source.as_ref(), listener.query(), listener.filters(), Some(after))
            .await?;
        listener.mark_seen(ids);

        let frame = OutFrame::new(
            listener.header(Event::FetchResponse),
            &SnapshotPayload {
                data: page,
                applied_filters: filters_to_wire(listener.filters()),
            },
        )?;
        conn.send(&frame, QoS::Reliable { timeout_ms: 0 }).await
    }

    pub fn unsubscribe(&self, conn_id: u64, channel: &str) -> bool {
        self.hub.remove(channel, conn_id)
    }

    /// Deregister everything a closing connection owns.
    pub fn close_connection(&self, conn_id: u64) -> usize {
        self.hub.remove_connection(conn_id)
    }

    async fn load_page(
        &self,
        source: &dyn DataSource,
        query: SubscriptionQuery,
        filters: &Filters,
        after: Option<CursorPosition>,
    ) -> Result<(CursorPage<AnyEnvelope>, Vec<String>)> {
        // One extra row tells us whether another page exists.
        let pagination = Pagination {
            limit: query.limit + 1,
            after,
            direction: query.direction,
        };
        let mut rows = source.fetch_page(&pagination, filters).await?;
        let has_more = rows.len() > query.limit;
        rows.truncate(query.limit);

        let next_cursor = match rows.last() {
            Some(last) if has_more => Some(Cursor::new(&last.id, last.created_at).encode()?),
            _ => None,
        };
        let count = source.count(filters).await?;

        let ids = rows.iter().map(|r| r.id.clone()).collect();
        let data = rows
            .iter()
            .map(|r| self.types.pack(r, None))
            .collect::<Result<Vec<_>>>()?;

        Ok((
            CursorPage {
                data,
                count,
                next_cursor,
            },
            ids,
        ))
    }
}

/// Keep only the filter fields the source understands.
fn honor_filters(fields: &[String], requested: Filters) -> (Filters, WireFilters) {
    let honored: Filters = requested
        .into_iter()
        .filter(|(k, _)| {
            let ok = fields.iter().any(|f| f == k);
            if !ok {
                debug!(field = %k, "filter field not honored");
            }
            ok
        })
        .collect();
    let wire = filters_to_wire(&honored);
    (honored, wire)
}
