//! Engine trait — the abstraction over text-generation backends.
//!
//! An Engine takes a fully rendered prompt string and continues it, either
//! as a complete string or as a lazy stream of text deltas. It also owns the
//! two numbers the context budget is computed from: its maximum input length
//! and the length estimate for a candidate prompt.
//!
//! Implementations: local quantized models (Candle), OpenAI-compatible
//! completion servers, scripted engines for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::EngineError;

/// Sampling knobs passed through to the backend unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature (0.0 = deterministic, higher = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Top-k sampling cutoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    /// Repetition penalty (1.0 = off)
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Maximum tokens to generate; also the slice of the context window the
    /// budget loop reserves for output.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_temperature() -> f64 {
    1.0
}

fn default_top_p() -> Option<f64> {
    Some(0.9)
}

fn default_repeat_penalty() -> f32 {
    1.33
}

fn default_max_tokens() -> usize {
    100
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: None,
            repeat_penalty: default_repeat_penalty(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// A single delta in a streaming generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Partial text
    #[serde(default)]
    pub text: Option<String>,

    /// Whether this is the final delta
    #[serde(default)]
    pub done: bool,
}

impl StreamDelta {
    /// A text delta, more to follow.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            done: false,
        }
    }

    /// The end-of-sequence marker.
    pub fn done() -> Self {
        Self {
            text: None,
            done: true,
        }
    }
}

/// Rough token count estimate: 4 chars ≈ 1 token, rounding up.
///
/// Used wherever a backend has no tokenizer of its own (remote servers,
/// scripted engines). Good enough for budget checks; real tokenizers
/// override via [`Engine::estimate_length`].
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// The core Engine trait.
///
/// Every generation backend implements this trait. The responder calls
/// `generate_stream()` without knowing which backend is configured — pure
/// polymorphism.
#[async_trait]
pub trait Engine: Send + Sync {
    /// A human-readable name for this engine (e.g., "remote", "local").
    fn name(&self) -> &str;

    /// Length of `text` in the engine's native unit (tokens).
    fn estimate_length(&self, text: &str) -> usize;

    /// Maximum input length the engine accepts, in the same unit.
    fn max_context(&self) -> usize;

    /// Continue `prompt`, yielding a finite sequence of text deltas.
    ///
    /// The stream is cancelable: dropping the receiver tells the backend to
    /// stop producing. It is not restartable — a new call starts a new
    /// generation.
    async fn generate_stream(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamDelta, EngineError>>,
        EngineError,
    >;

    /// Continue `prompt` and return the complete output.
    ///
    /// Default implementation drains `generate_stream()`.
    async fn generate_blocking(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
    ) -> std::result::Result<String, EngineError> {
        let mut rx = self.generate_stream(prompt, sampling).await?;
        let mut output = String::new();
        while let Some(delta) = rx.recv().await {
            let delta = delta?;
            if let Some(text) = delta.text {
                output.push_str(&text);
            }
            if delta.done {
                break;
            }
        }
        Ok(output)
    }

    /// Health check — is the backend loaded/reachable?
    async fn health_check(&self) -> std::result::Result<bool, EngineError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_defaults() {
        let params = SamplingParams::default();
        assert!((params.temperature - 1.0).abs() < f64::EPSILON);
        assert_eq!(params.top_p, Some(0.9));
        assert_eq!(params.top_k, None);
        assert_eq!(params.max_tokens, 100);
    }

    #[test]
    fn estimate_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("12345678901234567890"), 5);
    }

    #[test]
    fn delta_constructors() {
        let d = StreamDelta::text("hello");
        assert_eq!(d.text.as_deref(), Some("hello"));
        assert!(!d.done);
        assert!(StreamDelta::done().done);
    }

    struct SplitEngine;

    #[async_trait]
    impl Engine for SplitEngine {
        fn name(&self) -> &str {
            "split"
        }

        fn estimate_length(&self, text: &str) -> usize {
            estimate_tokens(text)
        }

        fn max_context(&self) -> usize {
            1024
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _sampling: &SamplingParams,
        ) -> std::result::Result<
            tokio::sync::mpsc::Receiver<std::result::Result<StreamDelta, EngineError>>,
            EngineError,
        > {
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx.send(Ok(StreamDelta::text("one "))).await;
                let _ = tx.send(Ok(StreamDelta::text("two"))).await;
                let _ = tx.send(Ok(StreamDelta::done())).await;
            });
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn blocking_default_drains_stream() {
        let engine = SplitEngine;
        let output = engine
            .generate_blocking("prompt", &SamplingParams::default())
            .await
            .unwrap();
        assert_eq!(output, "one two");
    }
}
