//! Transcript store implementations for palaver.
//!
//! A store receives the full log of a conversation when it is reset or
//! flushed at shutdown. Stores never participate in prompting; they are
//! write-only archives.

pub mod file_store;
pub mod memory_store;
pub mod noop;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use noop::NoopStore;

use std::sync::Arc;

use palaver_config::TranscriptConfig;
use palaver_core::TranscriptStore;
use tracing::warn;

/// Build the configured transcript store.
pub fn build_from_config(config: &TranscriptConfig) -> Arc<dyn TranscriptStore> {
    match config.store.as_str() {
        "file" => Arc::new(FileStore::new(config.dir.clone())),
        "memory" => Arc::new(MemoryStore::new()),
        "none" => Arc::new(NoopStore),
        other => {
            warn!(store = other, "Unknown transcript store, using files");
            Arc::new(FileStore::new(config.dir.clone()))
        }
    }
}
