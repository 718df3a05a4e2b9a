//! # Palaver Core
//!
//! Domain types, traits, and error definitions for the palaver chatbot
//! runtime. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod turn;
pub mod engine;
pub mod channel;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use turn::{Turn, ExchangeId};
pub use engine::{Engine, SamplingParams, StreamDelta, estimate_tokens};
pub use channel::{Channel, ChannelEvent, ChannelId};
pub use transcript::TranscriptStore;
