//! Remote engine — an OpenAI-compatible text completion server.
//!
//! Works with: llama.cpp server, vLLM, text-generation-inference, Ollama,
//! and any endpoint exposing `/v1/completions` with SSE streaming.
//!
//! The bot prompt is a raw chat transcript, so this engine deliberately
//! targets the plain completion API rather than chat completions: the
//! server continues the text and never re-wraps it in chat roles.

use async_trait::async_trait;
use futures::StreamExt;
use palaver_core::error::EngineError;
use palaver_core::{Engine, SamplingParams, StreamDelta, estimate_tokens};
use palaver_config::RemoteEngineConfig;
use serde::Deserialize;
use tracing::{debug, trace, warn};

/// An engine backed by a remote OpenAI-compatible completion server.
pub struct RemoteEngine {
    base_url: String,
    model: String,
    api_key: String,
    context_length: usize,
    client: reqwest::Client,
}

impl RemoteEngine {
    /// Create a new remote engine.
    ///
    /// `base_url` should include the API prefix, e.g.
    /// `http://localhost:8080/v1`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: String::new(),
            context_length: 2048,
            client,
        }
    }

    /// Set the API key sent as a bearer token. Local servers usually
    /// need none, in which case the header is omitted entirely.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the context window of the served model, in tokens.
    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    /// Build from configuration, preferring the engine-level key over the
    /// top-level one.
    pub fn from_config(config: &RemoteEngineConfig, fallback_key: Option<&str>) -> Self {
        let api_key = config
            .api_key
            .as_deref()
            .or(fallback_key)
            .unwrap_or_default();

        Self::new(&config.base_url, &config.model)
            .with_api_key(api_key)
            .with_context_length(config.context_length)
    }

    /// Assemble the completion request body.
    fn request_body(&self, prompt: &str, sampling: &SamplingParams, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "temperature": sampling.temperature,
            "max_tokens": sampling.max_tokens,
            "repeat_penalty": sampling.repeat_penalty,
            "stream": stream,
        });

        if let Some(top_p) = sampling.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(top_k) = sampling.top_k {
            body["top_k"] = serde_json::json!(top_k);
        }

        body
    }

    fn post(&self, url: &str, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);

        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        request
    }
}

/// Map a reqwest transport failure onto the engine error space.
fn map_request_err(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout(e.to_string())
    } else {
        EngineError::Network(e.to_string())
    }
}

#[async_trait]
impl Engine for RemoteEngine {
    fn name(&self) -> &str {
        "remote"
    }

    fn estimate_length(&self, text: &str) -> usize {
        estimate_tokens(text)
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
        let url = format!("{}/completions", self.base_url);
        let body = self.request_body(prompt, sampling, true);

        debug!(model = %self.model, "Sending streaming completion request");

        let response = self
            .post(&url, &body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(map_request_err)?;

        let status = response.status().as_u16();

        if status == 429 {
            warn!("Completion server rate limited the request");
            return Err(EngineError::ApiError {
                status_code: status,
                message: "Rate limited".into(),
            });
        }

        if status == 401 || status == 403 {
            return Err(EngineError::ApiError {
                status_code: status,
                message: "Invalid API key or insufficient permissions".into(),
            });
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Completion server returned an error");
            return Err(EngineError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let model = self.model.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(EngineError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                // Append new bytes to our line buffer
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // Skip empty lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    // Handle "data: ..." lines
                    if let Some(data) = line.strip_prefix("data: ") {
                        let data = data.trim();

                        // "[DONE]" signals end of stream
                        if data == "[DONE]" {
                            let _ = tx.send(Ok(StreamDelta::done())).await;
                            return;
                        }

                        // Parse the JSON chunk
                        match serde_json::from_str::<StreamResponse>(data) {
                            Ok(parsed) => {
                                if let Some(choice) = parsed.choices.first() {
                                    if let Some(text) =
                                        choice.text.as_deref().filter(|t| !t.is_empty())
                                    {
                                        if tx.send(Ok(StreamDelta::text(text))).await.is_err() {
                                            return; // receiver dropped
                                        }
                                    }

                                    if choice.finish_reason.is_some() {
                                        let _ = tx.send(Ok(StreamDelta::done())).await;
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                trace!(
                                    model = %model,
                                    data = %data,
                                    error = %e,
                                    "Ignoring unparseable SSE chunk"
                                );
                            }
                        }
                    }
                }
            }

            // Stream ended without [DONE] — send final chunk
            let _ = tx.send(Ok(StreamDelta::done())).await;
        });

        Ok(rx)
    }

    async fn generate_blocking(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
    ) -> std::result::Result<String, EngineError> {
        let url = format!("{}/completions", self.base_url);
        let body = self.request_body(prompt, sampling, false);

        debug!(model = %self.model, "Sending completion request");

        let response = self
            .post(&url, &body)
            .send()
            .await
            .map_err(map_request_err)?;

        let status = response.status().as_u16();

        if status == 429 {
            warn!("Completion server rate limited the request");
            return Err(EngineError::ApiError {
                status_code: status,
                message: "Rate limited".into(),
            });
        }

        if status == 401 || status == 403 {
            return Err(EngineError::ApiError {
                status_code: status,
                message: "Invalid API key or insufficient permissions".into(),
            });
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Completion server returned an error");
            return Err(EngineError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: CompletionResponse =
            response.json().await.map_err(|e| EngineError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(choice.text)
    }

    async fn health_check(&self) -> std::result::Result<bool, EngineError> {
        let url = format!("{}/models", self.base_url);

        let mut request = self.client.get(&url);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- Completion API types (internal) ---

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
}
