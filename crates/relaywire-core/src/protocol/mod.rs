//! Protocol modules.
//!
//! - `hybrid`: length-prefixed JSON header + binary payload framing, plus the
//!   JSON text frame used in debug mode.
//! - `any`: the polymorphic `Any` envelope and its type registry.
//! - `filters`, `cursor`, `update`: subscription payloads.
//! - `rpc`, `ipc`: request/response shapes for calls and cross-process commands.
//!
//! All parsers are panic-free: malformed input is reported as `RelayError`
//! instead of panicking or indexing raw buffers.

pub mod any;
pub mod cursor;
pub mod filters;
pub mod hybrid;
pub mod ipc;
pub mod rpc;
pub mod update;
