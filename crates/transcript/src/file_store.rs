//! File transcript store — one JSONL file per retired conversation.
//!
//! Every persist call writes a fresh file named
//! `{exchange_id}_{timestamp}.jsonl` under the store directory, one
//! JSON-encoded turn per line. Files are never appended to or rewritten;
//! a conversation that resets twice leaves two files.
//!
//! Default location: `~/.palaver/transcripts/`

use async_trait::async_trait;
use chrono::Utc;
use palaver_core::error::TranscriptError;
use palaver_core::{ExchangeId, TranscriptStore, Turn};
use std::path::PathBuf;
use tracing::debug;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default directory: `~/.palaver/transcripts`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".palaver").join("transcripts")
    }

    /// Millisecond timestamps keep names unique in practice; the counter
    /// suffix covers two resets landing in the same millisecond.
    fn unique_path(&self, exchange_id: &ExchangeId) -> PathBuf {
        let stamp = Utc::now().timestamp_millis();
        let mut path = self.dir.join(format!("{exchange_id}_{stamp}.jsonl"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{exchange_id}_{stamp}-{n}.jsonl"));
            n += 1;
        }
        path
    }
}

#[async_trait]
impl TranscriptStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn persist(
        &self,
        exchange_id: &ExchangeId,
        turns: &[Turn],
    ) -> Result<(), TranscriptError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            TranscriptError::Storage(format!("Failed to create transcript directory: {e}"))
        })?;

        let mut content = String::new();
        for turn in turns {
            let line = serde_json::to_string(turn)
                .map_err(|e| TranscriptError::Serialization(e.to_string()))?;
            content.push_str(&line);
            content.push('\n');
        }

        let path = self.unique_path(exchange_id);
        std::fs::write(&path, &content)
            .map_err(|e| TranscriptError::Storage(format!("Failed to write transcript: {e}")))?;

        debug!(path = %path.display(), turns = turns.len(), "Transcript written");
        Ok(())
    }
}
