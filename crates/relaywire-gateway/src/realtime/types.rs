use axum::extract::ws::Message;
use serde::Serialize;
use serde_json::Value;

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::hybrid::{encode_hybrid, Header, TextFrame};

/// Quality-of-Service strategy for outgoing delivery.
#[derive(Debug, Clone, Copy, Default)]
pub enum QoS {
    /// Subscription pushes: do not await; if the connection's queue is full, drop.
    #[default]
    Lossy,
    /// Replies: wait for queue space, optionally bounded.
    Reliable { timeout_ms: u64 },
}

/// How a connection wants its frames encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireMode {
    /// `[u32 BE len][JSON header][payload]` binary frames.
    #[default]
    Binary,
    /// One JSON text frame with header and plain JSON payload (debug).
    Text,
}

/// Application-level outgoing message: routing header plus JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OutFrame {
    pub header: Header,
    pub payload: Option<Value>,
}

impl OutFrame {
    pub fn new<T: Serialize>(header: Header, payload: &T) -> Result<Self> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| RelayError::Internal(format!("json encode failed: {e}")))?;
        Ok(Self {
            header,
            payload: Some(payload),
        })
    }

    pub fn header_only(header: Header) -> Self {
        Self {
            header,
            payload: None,
        }
    }
}

/// Frame encoded for one wire mode (serialize once, send N times).
#[derive(Debug, Clone)]
pub enum PreparedMsg {
    Text(String),
    Binary(Vec<u8>),
}

impl PreparedMsg {
    pub fn prepare(frame: &OutFrame, mode: WireMode) -> Result<Self> {
        match mode {
            WireMode::Text => {
                let text = TextFrame {
                    header: frame.header.clone(),
                    payload: frame.payload.clone(),
                };
                Ok(PreparedMsg::Text(text.encode()?))
            }
            WireMode::Binary => {
                let body = match &frame.payload {
                    Some(v) => serde_json::to_vec(v)
                        .map_err(|e| RelayError::Internal(format!("json encode failed: {e}")))?,
                    None => Vec::new(),
                };
                Ok(PreparedMsg::Binary(encode_hybrid(&frame.header, &body)?.to_vec()))
            }
        }
    }

    pub fn into_ws_message(self) -> Message {
        match self {
            PreparedMsg::Text(s) => Message::Text(s),
            PreparedMsg::Binary(b) => Message::Binary(b),
        }
    }
}
