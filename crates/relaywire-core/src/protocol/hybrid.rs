//! Hybrid message framing (panic-free).
//!
//! Layout: `[u32 BE header length][UTF-8 JSON header][binary payload]`.
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.
//!
//! The codec knows nothing about the payload; higher layers pick how to read it
//! from the header's `event`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Size of the big-endian header length prefix.
pub const HEADER_LEN_PREFIX: usize = 4;

/// Event kinds carried in the routing header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    #[serde(rename = "snapshot")]
    Snapshot,
    #[serde(rename = "update")]
    Update,
    #[serde(rename = "fetchMore")]
    FetchMore,
    #[serde(rename = "fetch_response")]
    FetchResponse,
    #[serde(rename = "rpc_response")]
    RpcResponse,
    #[serde(rename = "subscribe")]
    Subscribe,
    #[serde(rename = "unsubscribe")]
    Unsubscribe,
    #[serde(rename = "rpc")]
    Rpc,
    #[serde(rename = "error")]
    Error,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Snapshot => "snapshot",
            Event::Update => "update",
            Event::FetchMore => "fetchMore",
            Event::FetchResponse => "fetch_response",
            Event::RpcResponse => "rpc_response",
            Event::Subscribe => "subscribe",
            Event::Unsubscribe => "unsubscribe",
            Event::Rpc => "rpc",
            Event::Error => "error",
        }
    }
}

/// Routing header (message id, event kind, channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Header {
    pub fn new(event: Event) -> Self {
        Self {
            id: None,
            event,
            channel: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Decoded hybrid message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridMessage {
    pub header: Header,
    /// `None` when no bytes follow the header.
    pub payload: Option<Bytes>,
}

/// Frame `header` and `payload` into one binary message.
pub fn encode_hybrid(header: &Header, payload: &[u8]) -> Result<Bytes> {
    let header_bytes = serde_json::to_vec(header)
        .map_err(|e| RelayError::Internal(format!("header encode failed: {e}")))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| RelayError::Internal("header exceeds u32 length".into()))?;

    let mut out = BytesMut::with_capacity(HEADER_LEN_PREFIX + header_bytes.len() + payload.len());
    out.put_u32(header_len);
    out.put_slice(&header_bytes);
    out.put_slice(payload);
    Ok(out.freeze())
}

/// Decode a hybrid message from bytes.
pub fn decode_hybrid(mut buf: Bytes) -> Result<HybridMessage> {
    if buf.remaining() < HEADER_LEN_PREFIX {
        return Err(RelayError::Framing("missing header length"));
    }
    let header_len = buf.get_u32() as usize;

    if buf.remaining() < header_len {
        return Err(RelayError::Framing("incomplete or corrupted header"));
    }
    let header_bytes = buf.copy_to_bytes(header_len);

    // Two steps so "not JSON" and "JSON of the wrong shape" stay distinguishable.
    let raw: Value = serde_json::from_slice(&header_bytes)
        .map_err(|_| RelayError::Framing("invalid JSON header"))?;
    let header: Header =
        serde_json::from_value(raw).map_err(|_| RelayError::Framing("unrecognized header fields"))?;

    let payload = if buf.has_remaining() {
        Some(buf.copy_to_bytes(buf.remaining()))
    } else {
        None
    };

    Ok(HybridMessage { header, payload })
}

/// Debug/text mode: header and plain JSON payload in one text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFrame {
    pub header: Header,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl TextFrame {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RelayError::Internal(format!("text frame encode failed: {e}")))
    }

    pub fn decode(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|_| RelayError::Framing("invalid JSON text frame"))
    }
}
