//! Realtime egress: per-connection outbound queues and frame preparation.

pub mod connection;
pub mod types;

pub use connection::{Connection, PushOutcome};
pub use types::{OutFrame, PreparedMsg, QoS, WireMode};
