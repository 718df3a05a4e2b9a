//! Scripted engine — replays canned lines instead of calling a model.
//!
//! Useful for demos and dry runs: triggers, windowing, filtering, and
//! commands all behave exactly as with a real backend, but replies come
//! from a fixed rotation.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use palaver_core::error::EngineError;
use palaver_core::{Engine, SamplingParams, StreamDelta, estimate_tokens};

const DEFAULT_LINES: &[&str] = &[
    "Sure, tell me more.",
    "That tracks.",
    "Bold claim, but fine.",
    "I was literally just thinking that.",
];

/// An engine that cycles through a fixed list of replies.
pub struct ScriptedEngine {
    lines: Vec<String>,
    cursor: AtomicUsize,
    context_length: usize,
}

impl ScriptedEngine {
    /// Create a scripted engine. An empty script falls back to the
    /// built-in rotation.
    pub fn new(lines: Vec<String>) -> Self {
        let lines = if lines.is_empty() {
            DEFAULT_LINES.iter().map(|s| s.to_string()).collect()
        } else {
            lines
        };

        Self {
            lines,
            cursor: AtomicUsize::new(0),
            context_length: 2048,
        }
    }

    /// Set the advertised context window, in tokens.
    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    fn next_line(&self) -> String {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.lines.len();
        self.lines[index].clone()
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn estimate_length(&self, text: &str) -> usize {
        estimate_tokens(text)
    }

    fn max_context(&self) -> usize {
        self.context_length
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _sampling: &SamplingParams,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamDelta, EngineError>>,
        EngineError,
    > {
        let line = self.next_line();
        let (tx, rx) = tokio::sync::mpsc::channel(8);

        // Emit one delta per word so downstream truncation sees a real stream
        tokio::spawn(async move {
            for (i, word) in line.split_whitespace().enumerate() {
                let piece = if i == 0 {
                    word.to_string()
                } else {
                    format!(" {word}")
                };
                if tx.send(Ok(StreamDelta::text(piece))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(StreamDelta::done())).await;
        });

        Ok(rx)
    }
}
