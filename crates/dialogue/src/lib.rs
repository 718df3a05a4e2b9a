//! The conversation engine — the heart of palaver.
//!
//! One inbound message flows through the pipeline:
//!
//! 1. **Receive** a channel event (chat message, DM, command)
//! 2. **Buffer** it as a turn in the exchange's conversation log
//! 3. **Decide** whether the bot should speak at all
//! 4. **Render** the active window into a prompt and evict until it fits
//! 5. **Stream** the continuation, truncating at the first stop match
//! 6. **Screen** the result (whitespace, blocked terms, stale session)
//! 7. **Commit** the reply to the buffer and deliver it
//!
//! Admin commands short-circuit at step 2: they operate on the buffer
//! directly and never become conversation turns.

pub mod buffer;
pub mod command;
pub mod dispatcher;
pub mod formatter;
pub mod responder;

pub use buffer::ConversationBuffer;
pub use command::{command_prefix, parse_command, usage, CommandRequest, ParsedCommand};
pub use dispatcher::Dispatcher;
pub use formatter::PromptFormatter;
pub use responder::{RespondError, Responder, ResponseOutcome, SharedBuffer};
