//! Built-in services: a liveness RPC and bot control over the command bus.

pub mod bots;
pub mod system;

pub use bots::{
    seed_demo_bots, BotAction, BotCommandHandler, BotControl, BotInput, BotStatus, BotVia,
    BOTS_CHANNEL, BOT_STATUS_TYPE_URL,
};
pub use system::{Ping, PingHandler, PingInput, Pong, PONG_TYPE_URL};
