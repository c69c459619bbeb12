//! Decode-once codec for the transport layer.
//!
//! - Binary frames => hybrid header + JSON payload (panic-free `bytes::Buf` parsing in core)
//! - Text frames => `{header, payload}` or a bare `{id, method, data}` RPC request
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use bytes::Bytes;
use serde_json::Value;

use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::hybrid::{decode_hybrid, Header, TextFrame};
use relaywire_core::protocol::rpc::RpcRequest;

use crate::realtime::WireMode;

#[derive(Debug)]
pub enum Inbound {
    Frame {
        header: Header,
        payload: Value,
        mode: WireMode,
    },
    Rpc {
        req: RpcRequest,
        mode: WireMode,
    },
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Binary(b) => {
            let frame = decode_hybrid(Bytes::from(b))?;
            let payload = match frame.payload {
                Some(p) => serde_json::from_slice(&p)
                    .map_err(|e| RelayError::BadRequest(format!("invalid JSON payload: {e}")))?,
                None => Value::Null,
            };
            Ok(Inbound::Frame {
                header: frame.header,
                payload,
                mode: WireMode::Binary,
            })
        }
        Message::Text(s) => decode_text(&s),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(v) => Ok(Inbound::Pong(v)),
        Message::Close(_) => Ok(Inbound::Close),
    }
}

fn decode_text(s: &str) -> Result<Inbound> {
    let value: Value =
        serde_json::from_str(s).map_err(|_| RelayError::Framing("invalid JSON text frame"))?;
    if value.get("header").is_some() {
        let frame = TextFrame::decode(s)?;
        return Ok(Inbound::Frame {
            header: frame.header,
            payload: frame.payload.unwrap_or(Value::Null),
            mode: WireMode::Text,
        });
    }
    if value.get("method").is_some() {
        let req: RpcRequest = serde_json::from_value(value)
            .map_err(|e| RelayError::BadRequest(format!("invalid rpc request: {e}")))?;
        return Ok(Inbound::Rpc {
            req,
            mode: WireMode::Text,
        });
    }
    Err(RelayError::Framing("text frame needs a header or a method"))
}
