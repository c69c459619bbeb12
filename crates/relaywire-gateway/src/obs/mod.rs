//! Observability: in-process metrics and the scoped logger decorator.

pub mod log;
pub mod metrics;

pub use log::{Log, Prefixed, TracingLog};
pub use metrics::RelayMetrics;
