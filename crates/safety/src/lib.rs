//! Safety module for palaver — blocklist screening of generated text.
//!
//! Provides:
//! - **ContentFilter**: one compiled case-insensitive alternation over a
//!   rot13-obfuscated term list
//! - **global()**: the process-wide filter built from the embedded list

pub mod filter;

pub use filter::{decode_rot13, global, ContentFilter, FilterError};
