//! Messaging-platform integration: the Bot API client and the moderator
//! command surface fed by webhook updates.

pub mod client;
pub mod commands;

pub use client::{BotApi, Platform};
pub use commands::{CommandRouter, Update};
