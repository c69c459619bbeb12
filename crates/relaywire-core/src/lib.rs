//! relaywire core: transport-agnostic protocol primitives and error types.
//!
//! This crate defines the wire-level contracts shared by the gateway, worker
//! processes and client tooling: hybrid message framing, the polymorphic
//! `Any` container with its type registry, subscription payloads, cursors,
//! and the RPC / IPC message shapes. It carries no async runtime so the same
//! types can be used on both sides of the broker.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed input surfaces as `RelayError` so a bad frame only costs the
//! message it arrived in.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ClientCode, FieldIssue, RelayError, Result};
