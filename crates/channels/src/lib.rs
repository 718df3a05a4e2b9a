//! Chat channel implementations for palaver.
//!
//! Each channel connects the bot to a chat surface and relays events
//! to/from the dialogue loop. Channels are trait-based and platform
//! agnostic.
//!
//! Available channels:
//! - **Console** — interactive terminal chat (stdin/stdout)
//! - **Discord** — Discord gateway adapter (stub with event injection)

pub mod console;
pub mod discord;

pub use console::ConsoleChannel;
pub use discord::{DiscordChannel, DiscordConfig};
