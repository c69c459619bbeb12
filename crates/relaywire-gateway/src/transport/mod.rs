//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler and the codec that decodes each message
//! once before it reaches the subscription engine or the RPC dispatcher.

pub mod codec;
pub mod ws;
