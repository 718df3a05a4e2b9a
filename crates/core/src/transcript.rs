//! Transcript trait — persistent storage for finished exchanges.
//!
//! A transcript store receives the full log of an exchange exactly once,
//! when the exchange is reset. Appending to a live buffer never touches
//! storage; the two concerns are deliberately separate operations.

use async_trait::async_trait;
use crate::error::TranscriptError;
use crate::turn::{ExchangeId, Turn};

/// The core TranscriptStore trait.
///
/// Implementations: JSONL files, in-memory (for testing), none (no-op).
/// A persist failure is reported to the caller, who logs and moves on —
/// losing a backup log must never block the live conversation.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// The store name (e.g., "file", "memory", "none").
    fn name(&self) -> &str;

    /// Write one finished exchange. `turns` is the full log in
    /// chronological order, eviction pointer ignored.
    async fn persist(
        &self,
        exchange_id: &ExchangeId,
        turns: &[Turn],
    ) -> std::result::Result<(), TranscriptError>;
}
