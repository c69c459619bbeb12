//! Snapshot and incremental update payloads.

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::protocol::filters::WireFilters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Added,
    Updated,
    Deleted,
}

/// One incremental change for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateItem<T> {
    pub id: String,
    pub action: UpdateAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Clients drop `updated` deliveries older than the version they hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl<T> UpdateItem<T> {
    pub fn added(id: impl Into<String>, data: T, version: Option<i64>) -> Self {
        Self {
            id: id.into(),
            action: UpdateAction::Added,
            data: Some(data),
            version,
        }
    }

    pub fn updated(id: impl Into<String>, data: T, version: i64) -> Self {
        Self {
            id: id.into(),
            action: UpdateAction::Updated,
            data: Some(data),
            version: Some(version),
        }
    }

    pub fn deleted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: UpdateAction::Deleted,
            data: None,
            version: None,
        }
    }

    /// Check the action/data/version invariants, e.g. on items read off the wire.
    pub fn validate(&self) -> Result<()> {
        match self.action {
            UpdateAction::Added if self.data.is_none() => {
                Err(RelayError::BadRequest("added item requires data".into()))
            }
            UpdateAction::Updated if self.data.is_none() || self.version.is_none() => Err(
                RelayError::BadRequest("updated item requires data and version".into()),
            ),
            UpdateAction::Deleted if self.data.is_some() || self.version.is_some() => Err(
                RelayError::BadRequest("deleted item carries no data or version".into()),
            ),
            _ => Ok(()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> UpdateItem<U> {
        UpdateItem {
            id: self.id,
            action: self.action,
            data: self.data.map(f),
            version: self.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesPayload<T> {
    pub items: Vec<UpdateItem<T>>,
    pub applied_filters: WireFilters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub data: Vec<T>,
    pub count: u64,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload<T> {
    pub data: CursorPage<T>,
    pub applied_filters: WireFilters,
}
