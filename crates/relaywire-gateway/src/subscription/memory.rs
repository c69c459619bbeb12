//! In-memory table implementing the data-layer seam.
//!
//! Stands in for the relational store: keyset pagination over `(created_at,
//! id)`, equality/membership filters on JSON fields, and a change event for
//! every write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};

use relaywire_core::error::Result;
use relaywire_core::protocol::cursor::{keyset_cmp, Pagination};
use relaywire_core::protocol::filters::{matches_filters, Filters};

use crate::subscription::source::{ChangeEvent, ChangeSink, DataSource, Record};

pub struct MemoryTable {
    channel: String,
    filterable: Vec<String>,
    rows: DashMap<String, Record>,
    sink: Option<Arc<dyn ChangeSink>>,
}

impl MemoryTable {
    pub fn new(channel: impl Into<String>, filterable: &[&str], sink: Option<Arc<dyn ChangeSink>>) -> Self {
        Self {
            channel: channel.into(),
            filterable: filterable.iter().map(|f| f.to_string()).collect(),
            rows: DashMap::new(),
            sink,
        }
    }

    pub fn upsert(&self, id: impl Into<String>, data: Value) -> Record {
        self.upsert_at(id, Utc::now(), data)
    }

    /// Insert or replace. `created_at` only applies to new rows.
    pub fn upsert_at(&self, id: impl Into<String>, created_at: DateTime<Utc>, data: Value) -> Record {
        let id = id.into();
        let record = {
            let mut row = self.rows.entry(id.clone()).or_insert_with(|| Record {
                id,
                created_at,
                version: 0,
                data: Value::Null,
            });
            row.version += 1;
            row.data = data;
            row.clone()
        };
        self.emit(ChangeEvent::Upsert(record.clone()));
        record
    }

    /// Merge `fields` into an existing row's data object.
    pub fn patch(&self, id: &str, fields: Map<String, Value>) -> Option<Record> {
        let record = {
            let mut row = self.rows.get_mut(id)?;
            match &mut row.data {
                Value::Object(obj) => obj.extend(fields),
                other => *other = Value::Object(fields),
            }
            row.version += 1;
            row.clone()
        };
        self.emit(ChangeEvent::Upsert(record.clone()));
        Some(record)
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.rows.get(id).map(|r| r.value().clone())
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.rows.remove(id).is_some();
        if removed {
            self.emit(ChangeEvent::Delete { id: id.to_string() });
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn emit(&self, event: ChangeEvent) {
        if let Some(sink) = &self.sink {
            sink.publish(&self.channel, event);
        }
    }
}

#[async_trait]
impl DataSource for MemoryTable {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn filterable_fields(&self) -> &[String] {
        &self.filterable
    }

    async fn fetch_page(&self, page: &Pagination, filters: &Filters) -> Result<Vec<Record>> {
        let mut rows: Vec<Record> = self
            .rows
            .iter()
            .map(|r| r.value().clone())
            .filter(|r| matches_filters(filters, &r.data))
            .filter(|r| match &page.after {
                Some(pos) => pos.admits(page.direction, &r.created_at, &r.id),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| {
            keyset_cmp(page.direction, (&a.created_at, &a.id), (&b.created_at, &b.id))
        });
        rows.truncate(page.limit);
        Ok(rows)
    }

    async fn count(&self, filters: &Filters) -> Result<u64> {
        Ok(self
            .rows
            .iter()
            .filter(|r| matches_filters(filters, &r.value().data))
            .count() as u64)
    }
}
