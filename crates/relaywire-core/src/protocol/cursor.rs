//! Opaque pagination cursors and keyset ordering.
//!
//! A cursor is base64 of `{"lastPreviousId": .., "lastDate": ..}`. Only the
//! server decodes it. Rows are ordered by `(date, id)`; the id breaks ties so
//! resuming after `(lastDate, lastPreviousId)` neither repeats nor skips a row.

use std::cmp::Ordering;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub last_previous_id: String,
    pub last_date: String,
}

impl Cursor {
    pub fn new(last_previous_id: impl Into<String>, last_date: DateTime<Utc>) -> Self {
        Self {
            last_previous_id: last_previous_id.into(),
            last_date: last_date.to_rfc3339(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| RelayError::Internal(format!("cursor encode failed: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    /// Decode failures are client errors.
    pub fn decode(s: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(s)
            .map_err(|_| RelayError::BadRequest("invalid cursor encoding".into()))?;
        serde_json::from_slice(&raw).map_err(|_| RelayError::BadRequest("invalid cursor".into()))
    }

    /// Parse into a comparable keyset position.
    pub fn position(&self) -> Result<CursorPosition> {
        let date = DateTime::parse_from_rfc3339(&self.last_date)
            .map_err(|_| RelayError::BadRequest("invalid cursor date".into()))?
            .with_timezone(&Utc);
        Ok(CursorPosition {
            date,
            id: self.last_previous_id.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Decoded cursor position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPosition {
    pub date: DateTime<Utc>,
    pub id: String,
}

/// Compare two keys in `direction`.
pub fn keyset_cmp(
    direction: SortDirection,
    a: (&DateTime<Utc>, &str),
    b: (&DateTime<Utc>, &str),
) -> Ordering {
    let asc = a.0.cmp(b.0).then_with(|| a.1.cmp(b.1));
    match direction {
        SortDirection::Asc => asc,
        SortDirection::Desc => asc.reverse(),
    }
}

impl CursorPosition {
    /// True when a row with key `(date, id)` comes strictly after this position.
    pub fn admits(&self, direction: SortDirection, date: &DateTime<Utc>, id: &str) -> bool {
        keyset_cmp(direction, (date, id), (&self.date, &self.id)) == Ordering::Greater
    }
}

/// Page request handed to the data layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub after: Option<CursorPosition>,
    pub direction: SortDirection,
}
