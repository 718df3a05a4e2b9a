//! Local engine — runs a GGUF-quantized model in-process via Candle.
//!
//! No server, no API key: the model is downloaded from Hugging Face on
//! first load and cached by `hf-hub`. Presets:
//! - **small** — TinyLlama 1.1B base, Q4_K_M (~670 MB), fine on a laptop CPU
//! - **large** — Mistral 7B base, Q4_K_M (~4.4 GB), needs real RAM
//!
//! Base (non-chat) checkpoints are deliberate: the prompt is a raw chat
//! transcript and the model just continues it, with no chat template in
//! the way.

use std::sync::Arc;

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama as qlm;
use hf_hub::api::sync::Api;
use palaver_config::LocalEngineConfig;
use palaver_core::error::EngineError;
use palaver_core::{Engine, SamplingParams, StreamDelta, estimate_tokens};
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// How far back the repetition penalty looks, in tokens.
const REPEAT_LAST_N: usize = 64;

// ── Model presets ──────────────────────────────────────────────────────

/// A preset resolves to a Hugging Face repo, a GGUF file, and a tokenizer.
struct ModelPreset {
    repo: &'static str,
    gguf_file: &'static str,
    tokenizer_repo: &'static str,
    context_length: usize,
}

fn resolve_preset(alias: &str) -> Option<ModelPreset> {
    match alias.to_lowercase().as_str() {
        "small" => Some(ModelPreset {
            repo: "TheBloke/TinyLlama-1.1B-intermediate-step-1431k-3T-GGUF",
            gguf_file: "tinyllama-1.1b-intermediate-step-1431k-3t.Q4_K_M.gguf",
            tokenizer_repo: "TinyLlama/TinyLlama-1.1B-intermediate-step-1431k-3T",
            context_length: 2048,
        }),
        "large" => Some(ModelPreset {
            repo: "TheBloke/Mistral-7B-v0.1-GGUF",
            gguf_file: "mistral-7b-v0.1.Q4_K_M.gguf",
            tokenizer_repo: "mistralai/Mistral-7B-v0.1",
            context_length: 4096,
        }),
        _ => None,
    }
}

// ── Local engine ───────────────────────────────────────────────────────

/// An engine that generates with a quantized Llama-architecture model.
///
/// The model sits behind a Mutex because Candle CPU inference is
/// single-threaded; concurrent generations queue up on the lock.
pub struct LocalEngine {
    state: Arc<Mutex<ModelState>>,
    tokenizer: Arc<Tokenizer>,
    context_length: usize,
}

struct ModelState {
    model: qlm::ModelWeights,
    device: Device,
    eos_token_id: u32,
}

impl LocalEngine {
    /// Download (if needed) and load the model eagerly.
    ///
    /// This blocks for however long the download and weight loading take,
    /// so call it from a blocking context during startup.
    pub fn load(config: &LocalEngineConfig) -> Result<Self, EngineError> {
        let device = Device::Cpu;

        let preset = resolve_preset(&config.preset).ok_or_else(|| {
            EngineError::ModelNotFound(format!(
                "Unknown local preset '{}'. Available presets: small, large.",
                config.preset
            ))
        })?;

        let repo_name = config
            .model_repo
            .clone()
            .unwrap_or_else(|| preset.repo.to_string());
        let gguf_file_name = config
            .gguf_file
            .clone()
            .unwrap_or_else(|| preset.gguf_file.to_string());
        let context_length = config.context_length.unwrap_or(preset.context_length);

        info!(
            repo = %repo_name,
            file = %gguf_file_name,
            "Downloading/loading local model"
        );

        let api = Api::new().map_err(|e| {
            EngineError::Network(format!("Failed to initialize HuggingFace Hub API: {e}"))
        })?;

        let repo = api.model(repo_name.clone());
        let model_path = repo.get(&gguf_file_name).map_err(|e| {
            EngineError::Network(format!(
                "Failed to download model '{gguf_file_name}' from '{repo_name}': {e}"
            ))
        })?;

        info!(path = %model_path.display(), "Model file ready");

        let tokenizer_repo = api.model(preset.tokenizer_repo.to_string());
        let tokenizer_path = tokenizer_repo.get("tokenizer.json").map_err(|e| {
            EngineError::Network(format!(
                "Failed to download tokenizer from '{}': {e}",
                preset.tokenizer_repo
            ))
        })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EngineError::NotConfigured(format!("Failed to load tokenizer: {e}")))?;

        let mut file = std::fs::File::open(&model_path)
            .map_err(|e| EngineError::NotConfigured(format!("Failed to open model file: {e}")))?;

        let gguf = gguf_file::Content::read(&mut file)
            .map_err(|e| EngineError::NotConfigured(format!("Failed to parse GGUF file: {e}")))?;

        let model = qlm::ModelWeights::from_gguf(gguf, &mut file, &device).map_err(|e| {
            EngineError::NotConfigured(format!("Failed to load model weights: {e}"))
        })?;

        let eos_token_id = tokenizer
            .token_to_id("</s>")
            .or_else(|| tokenizer.token_to_id("<|endoftext|>"))
            .or_else(|| tokenizer.token_to_id("<|im_end|>"))
            .or_else(|| tokenizer.token_to_id("<|eot_id|>"))
            .unwrap_or(2); // fallback to the common Llama EOS id

        info!(eos_token_id, context_length, "Local model loaded");

        Ok(Self {
            state: Arc::new(Mutex::new(ModelState {
                model,
                device,
                eos_token_id,
            })),
            tokenizer: Arc::new(tokenizer),
            context_length,
        })
    }
}

/// Translate the sampling knobs into a Candle sampling strategy.
fn sampling_mode(sampling: &SamplingParams) -> Sampling {
    if sampling.temperature <= 0.0 {
        return Sampling::ArgMax;
    }
    let temperature = sampling.temperature;
    match (sampling.top_k, sampling.top_p) {
        (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        (Some(k), None) => Sampling::TopK { k, temperature },
        (None, Some(p)) => Sampling::TopP { p, temperature },
        (None, None) => Sampling::All { temperature },
    }
}

/// Map Candle errors onto the engine error space.
fn map_candle_err(e: candle_core::Error) -> EngineError {
    EngineError::Backend(format!("Candle inference error: {e}"))
}

impl ModelState {
    /// Tokenize, run the token loop, and stream decoded text into `tx`.
    ///
    /// Returns Ok(()) both on normal completion and when the receiver is
    /// dropped mid-generation; an abandoned generation is not an error.
    fn generate_into(
        &mut self,
        tokenizer: &Tokenizer,
        prompt: &str,
        sampling: &SamplingParams,
        tx: &tokio::sync::mpsc::Sender<Result<StreamDelta, EngineError>>,
    ) -> Result<(), EngineError> {
        let encoding = tokenizer
            .encode(prompt, true)
            .map_err(|e| EngineError::Backend(format!("Tokenization failed: {e}")))?;
        let prompt_tokens = encoding.get_ids().to_vec();

        debug!(
            prompt_tokens = prompt_tokens.len(),
            max_tokens = sampling.max_tokens,
            "Starting local generation"
        );

        let seed = {
            use rand::Rng;
            rand::rng().random::<u64>()
        };
        let mut logits_processor = LogitsProcessor::from_sampling(seed, sampling_mode(sampling));

        // One pass over the whole prompt fills the KV cache.
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)
            .map_err(map_candle_err)?
            .unsqueeze(0)
            .map_err(map_candle_err)?;
        let logits = self.model.forward(&input, 0).map_err(map_candle_err)?;
        let logits = logits.squeeze(0).map_err(map_candle_err)?;
        let mut next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;

        let mut generated: Vec<u32> = Vec::new();
        let mut sent_len = 0;

        loop {
            if next_token == self.eos_token_id {
                break;
            }
            generated.push(next_token);

            // Re-decode the whole completion and stream out the new suffix;
            // decoding tokens one at a time would split multi-byte characters.
            let decoded = tokenizer
                .decode(&generated, true)
                .map_err(|e| EngineError::Backend(format!("Detokenization failed: {e}")))?;
            if decoded.len() > sent_len {
                if let Some(delta) = decoded.get(sent_len..) {
                    sent_len = decoded.len();
                    if tx.blocking_send(Ok(StreamDelta::text(delta))).is_err() {
                        debug!("Receiver dropped, stopping local generation");
                        return Ok(());
                    }
                }
            }

            if generated.len() >= sampling.max_tokens {
                break;
            }

            let input = Tensor::new(&[next_token][..], &self.device)
                .map_err(map_candle_err)?
                .unsqueeze(0)
                .map_err(map_candle_err)?;
            let logits = self
                .model
                .forward(&input, prompt_tokens.len() + generated.len() - 1)
                .map_err(map_candle_err)?;
            let logits = logits.squeeze(0).map_err(map_candle_err)?;
            let logits = if sampling.repeat_penalty == 1.0 {
                logits
            } else {
                let start_at = generated.len().saturating_sub(REPEAT_LAST_N);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    sampling.repeat_penalty,
                    &generated[start_at..],
                )
                .map_err(map_candle_err)?
            };
            next_token = logits_processor.sample(&logits).map_err(map_candle_err)?;
        }

        debug!(completion_tokens = generated.len(), "Local generation complete");
        Ok(())
    }
}

#[async_trait]
impl Engine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    fn estimate_length(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(_) => estimate_tokens(text),
        }
    }

    fn max_context(&self) -> usize {
        self.context_length
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamDelta, EngineError>>,
        EngineError,
    > {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let state = self.state.clone();
        let tokenizer = self.tokenizer.clone();
        let prompt = prompt.to_string();
        let sampling = sampling.clone();

        // Candle is CPU-bound; run the whole token loop off the async runtime
        tokio::task::spawn_blocking(move || {
            let mut guard = state.blocking_lock();
            match guard.generate_into(&tokenizer, &prompt, &sampling, &tx) {
                Ok(()) => {
                    let _ = tx.blocking_send(Ok(StreamDelta::done()));
                }
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_preset_aliases() {
        assert!(resolve_preset("small").is_some());
        assert!(resolve_preset("Small").is_some());
        assert!(resolve_preset("large").is_some());
        assert!(resolve_preset("enormous").is_none());
    }

    #[test]
    fn preset_context_lengths() {
        assert_eq!(resolve_preset("small").unwrap().context_length, 2048);
        assert_eq!(resolve_preset("large").unwrap().context_length, 4096);
    }

    #[test]
    fn zero_temperature_is_greedy() {
        let sampling = SamplingParams {
            temperature: 0.0,
            ..SamplingParams::default()
        };
        assert!(matches!(sampling_mode(&sampling), Sampling::ArgMax));
    }

    #[test]
    fn default_knobs_use_nucleus_sampling() {
        let sampling = SamplingParams::default();
        assert!(matches!(sampling_mode(&sampling), Sampling::TopP { .. }));
    }

    #[test]
    fn top_k_and_top_p_combine() {
        let sampling = SamplingParams {
            top_k: Some(40),
            ..SamplingParams::default()
        };
        assert!(matches!(
            sampling_mode(&sampling),
            Sampling::TopKThenTopP { .. }
        ));
    }

    #[test]
    fn bare_temperature_samples_everything() {
        let sampling = SamplingParams {
            top_p: None,
            top_k: None,
            ..SamplingParams::default()
        };
        assert!(matches!(sampling_mode(&sampling), Sampling::All { .. }));
    }
}
