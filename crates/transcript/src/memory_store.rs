//! In-memory transcript store — useful for testing and ephemeral runs.

use async_trait::async_trait;
use palaver_core::error::TranscriptError;
use palaver_core::{ExchangeId, TranscriptStore, Turn};
use std::sync::RwLock;

/// Records every persist call in a Vec instead of touching disk.
pub struct MemoryStore {
    records: RwLock<Vec<(ExchangeId, Vec<Turn>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of everything persisted so far, oldest first.
    pub fn persisted(&self) -> Vec<(ExchangeId, Vec<Turn>)> {
        match self.records.read() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn persist(
        &self,
        exchange_id: &ExchangeId,
        turns: &[Turn],
    ) -> Result<(), TranscriptError> {
        let record = (exchange_id.clone(), turns.to_vec());
        match self.records.write() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}
