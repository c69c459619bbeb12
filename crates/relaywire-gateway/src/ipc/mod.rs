//! Distributed command bus.
//!
//! The gateway side ([`CommandBus`]) publishes correlated commands and awaits
//! replies with a timeout; the worker side ([`CommandWorker`]) executes them
//! and publishes the reply on the response channel.

pub mod bus;
pub mod worker;

pub use bus::CommandBus;
pub use worker::{CommandHandler, CommandWorker};
