//! Per-channel listener registry and change fan-out.
//!
//! `channel -> {connection id -> listener}`. Each listener remembers which ids
//! its client has been given, so an upsert becomes `added` the first time and
//! `updated` afterwards. Pushes are lossy: a full connection queue drops the
//! update instead of stalling the publisher.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::{debug, warn};

use relaywire_core::error::Result;
use relaywire_core::protocol::any::{AnyEnvelope, TypeRegistry};
use relaywire_core::protocol::cursor::SortDirection;
use relaywire_core::protocol::filters::{matches_filters, Filters, WireFilters};
use relaywire_core::protocol::hybrid::{Event, Header};
use relaywire_core::protocol::update::{UpdateItem, UpdatesPayload};

use crate::obs::RelayMetrics;
use crate::realtime::{Connection, OutFrame, PushOutcome};
use crate::subscription::source::{ChangeEvent, ChangeSink};

/// The query a subscription was opened with; `fetchMore` re-runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionQuery {
    pub limit: usize,
    pub direction: SortDirection,
}

pub struct Listener {
    conn: Connection,
    sub_id: Option<String>,
    channel: String,
    filters: Filters,
    applied: WireFilters,
    query: SubscriptionQuery,
    seen: DashSet<String>,
}

impl Listener {
    pub fn new(
        conn: Connection,
        sub_id: Option<String>,
        channel: impl Into<String>,
        filters: Filters,
        applied: WireFilters,
        query: SubscriptionQuery,
    ) -> Self {
        Self {
            conn,
            sub_id,
            channel: channel.into(),
            filters,
            applied,
            query,
            seen: DashSet::new(),
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn.id()
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn query(&self) -> SubscriptionQuery {
        self.query
    }

    pub fn mark_seen<I: IntoIterator<Item = String>>(&self, ids: I) {
        for id in ids {
            self.seen.insert(id);
        }
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub(crate) fn header(&self, event: Event) -> Header {
        let header = Header::new(event).with_channel(self.channel.clone());
        match &self.sub_id {
            Some(id) => header.with_id(id.clone()),
            None => header,
        }
    }
}

pub struct SubscriptionHub {
    channels: DashMap<String, DashMap<u64, Arc<Listener>>>,
    types: Arc<TypeRegistry>,
    metrics: Arc<RelayMetrics>,
}

impl SubscriptionHub {
    pub fn new(types: Arc<TypeRegistry>, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            channels: DashMap::new(),
            types,
            metrics,
        }
    }

    /// Register `listener`, replacing any previous one for the same connection and channel.
    pub fn insert(&self, listener: Arc<Listener>) -> Option<Arc<Listener>> {
        self.channels
            .entry(listener.channel.clone())
            .or_default()
            .insert(listener.conn_id(), listener)
    }

    pub fn get(&self, channel: &str, conn_id: u64) -> Option<Arc<Listener>> {
        self.channels
            .get(channel)
            .and_then(|subs| subs.get(&conn_id).map(|l| Arc::clone(l.value())))
    }

    pub fn remove(&self, channel: &str, conn_id: u64) -> bool {
        let removed = match self.channels.get(channel) {
            Some(subs) => subs.remove(&conn_id).is_some(),
            None => return false,
        };
        self.channels.remove_if(channel, |_, subs| subs.is_empty());
        removed
    }

    /// Drop every listener owned by `conn_id`. Returns how many were removed.
    pub fn remove_connection(&self, conn_id: u64) -> usize {
        let mut removed = 0;
        for subs in self.channels.iter() {
            if subs.value().remove(&conn_id).is_some() {
                removed += 1;
            }
        }
        self.channels.retain(|_, subs| !subs.is_empty());
        removed
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    fn item_for(&self, l: &Listener, event: &ChangeEvent) -> Result<Option<UpdateItem<AnyEnvelope>>> {
        match event {
            ChangeEvent::Upsert(record) => {
                if matches_filters(&l.filters, &record.data) {
                    let data = self.types.pack(record, None)?;
                    // insert() decides added vs updated atomically per id.
                    let item = if l.seen.insert(record.id.clone()) {
                        UpdateItem::added(record.id.clone(), data, Some(record.version))
                    } else {
                        UpdateItem::updated(record.id.clone(), data, record.version)
                    };
                    Ok(Some(item))
                } else {
                    // Left the filtered set, if the client had it.
                    Ok(l.seen.remove(&record.id).map(|_| UpdateItem::deleted(record.id.clone())))
                }
            }
            ChangeEvent::Delete { id } => Ok(l
                .seen
                .remove(id)
                .map(|_| UpdateItem::deleted(id.clone()))),
        }
    }
}

impl ChangeSink for SubscriptionHub {
    fn publish(&self, channel: &str, event: ChangeEvent) {
        // Snapshot the listener list so no shard lock is held while pushing.
        let listeners: Vec<Arc<Listener>> = match self.channels.get(channel) {
            Some(subs) => subs.iter().map(|e| Arc::clone(e.value())).collect(),
            None => return,
        };

        for l in listeners {
            let item = match self.item_for(&l, &event) {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(e) => {
                    warn!(channel, id = event.id(), error = %e, "update item build failed");
                    continue;
                }
            };

            let payload = UpdatesPayload {
                items: vec![item],
                applied_filters: l.applied.clone(),
            };
            let frame = match OutFrame::new(l.header(Event::Update), &payload) {
                Ok(f) => f,
                Err(e) => {
                    warn!(channel, error = %e, "update frame encode failed");
                    continue;
                }
            };

            match l.conn.push(&frame) {
                Ok(PushOutcome::Queued) => {}
                Ok(PushOutcome::Dropped) => {
                    self.metrics.pushes_dropped.inc(&[("channel", channel)]);
                    warn!(conn = l.conn_id(), channel, "outbound queue full, update dropped");
                }
                Ok(PushOutcome::Closed) => {
                    debug!(conn = l.conn_id(), channel, "update for closed connection discarded");
                }
                Err(e) => warn!(conn = l.conn_id(), channel, error = %e, "update push failed"),
            }
        }
    }
}
