//! No-op transcript store — retired conversations are simply dropped.

use async_trait::async_trait;
use palaver_core::error::TranscriptError;
use palaver_core::{ExchangeId, TranscriptStore, Turn};
use tracing::debug;

pub struct NoopStore;

#[async_trait]
impl TranscriptStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn persist(
        &self,
        exchange_id: &ExchangeId,
        turns: &[Turn],
    ) -> Result<(), TranscriptError> {
        debug!(exchange = %exchange_id, turns = turns.len(), "Transcript discarded");
        Ok(())
    }
}
