//! relaywire gateway library entry.
//!
//! Wires the transport, subscription engine, RPC dispatcher, command bus and
//! built-in services into one gateway stack. Consumed by the binary
//! (`main.rs`) and by integration tests.

pub mod app_state;
pub mod broker;
pub mod config;
pub mod ipc;
pub mod obs;
pub mod realtime;
pub mod router;
pub mod rpc;
pub mod services;
pub mod subscription;
pub mod transport;
