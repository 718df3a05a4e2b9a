//! Configuration loading, validation, and management for palaver.
//!
//! Loads configuration from `~/.palaver/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use palaver_core::SamplingParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.palaver/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for remote engines (overridable per-engine)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Persona: bot name and prompt preamble
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Generation engine selection and limits
    #[serde(default)]
    pub engine: EngineConfig,

    /// Sampling knobs / preset selection
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Content safety filter settings
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Transcript storage settings
    #[serde(default)]
    pub transcript: TranscriptConfig,

    /// Reply trigger behavior
    #[serde(default)]
    pub behavior: BehaviorConfig,

    /// Discord adapter settings
    #[serde(default)]
    pub discord: DiscordSection,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("persona", &self.persona)
            .field("engine", &self.engine)
            .field("sampling", &self.sampling)
            .field("safety", &self.safety)
            .field("transcript", &self.transcript)
            .field("behavior", &self.behavior)
            .field("discord", &self.discord)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// The bot's speaker name, as it appears in prompt lines
    #[serde(default = "default_name")]
    pub name: String,

    /// Scene-setting paragraph emitted once at the top of every prompt
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

fn default_name() -> String {
    "Palaver".into()
}

fn default_preamble() -> String {
    "Palaver is a chatroom regular with strong opinions and a short \
     attention span. What follows is the complete log of the conversation \
     so far. Palaver replies in character, one message at a time, and \
     never writes messages for anyone else."
        .into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            preamble: default_preamble(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which backend to run: "remote", "local", or "scripted"
    #[serde(default = "default_engine_kind")]
    pub kind: String,

    /// How many generations may run at once across all exchanges.
    /// Single-device backends should keep this at 1.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Remote (OpenAI-compatible completion server) settings
    #[serde(default)]
    pub remote: RemoteEngineConfig,

    /// Local (Candle) settings
    #[serde(default)]
    pub local: LocalEngineConfig,
}

fn default_engine_kind() -> String {
    "remote".into()
}
fn default_max_concurrent() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: default_engine_kind(),
            max_concurrent: default_max_concurrent(),
            remote: RemoteEngineConfig::default(),
            local: LocalEngineConfig::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteEngineConfig {
    /// Base URL of the completion API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent with each request
    #[serde(default = "default_remote_model")]
    pub model: String,

    /// Context window of the served model, in tokens
    #[serde(default = "default_context_length")]
    pub context_length: usize,

    /// Per-engine API key override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8080/v1".into()
}
fn default_remote_model() -> String {
    "default".into()
}
fn default_context_length() -> usize {
    2048
}

impl Default for RemoteEngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_remote_model(),
            context_length: default_context_length(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for RemoteEngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEngineConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("context_length", &self.context_length)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEngineConfig {
    /// Model preset alias: "small" or "large"
    #[serde(default = "default_local_preset")]
    pub preset: String,

    /// Override the Hugging Face repo of the preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_repo: Option<String>,

    /// Override the GGUF filename of the preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf_file: Option<String>,

    /// Override the preset's context window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<usize>,
}

fn default_local_preset() -> String {
    "small".into()
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            preset: default_local_preset(),
            model_repo: None,
            gguf_file: None,
            context_length: None,
        }
    }
}

/// Sampling configuration: an optional named preset plus field overrides.
///
/// Resolution order: preset (or the built-in defaults), then any explicit
/// field set here wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Named profile: "mellow" (conservative) or "wild" (high temperature)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl SamplingConfig {
    /// Resolve into concrete sampling parameters.
    pub fn resolve(&self) -> Result<SamplingParams, ConfigError> {
        let mut params = match self.preset.as_deref() {
            None => SamplingParams::default(),
            Some("mellow") => SamplingParams {
                temperature: 0.7,
                top_p: Some(0.9),
                top_k: None,
                repeat_penalty: 1.1,
                max_tokens: 100,
            },
            Some("wild") => SamplingParams {
                temperature: 1.3,
                top_p: Some(0.95),
                top_k: None,
                repeat_penalty: 1.33,
                max_tokens: 100,
            },
            Some(other) => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown sampling preset '{other}' (expected \"mellow\" or \"wild\")"
                )));
            }
        };

        if let Some(temperature) = self.temperature {
            params.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            params.top_p = Some(top_p);
        }
        if let Some(top_k) = self.top_k {
            params.top_k = Some(top_k);
        }
        if let Some(repeat_penalty) = self.repeat_penalty {
            params.repeat_penalty = repeat_penalty;
        }
        if let Some(max_tokens) = self.max_tokens {
            params.max_tokens = max_tokens;
        }
        Ok(params)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Whether generated text is screened before being accepted
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to a supplemental wordlist (rot13-encoded, one term per line),
    /// merged with the built-in list at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_wordlist: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_wordlist: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Storage backend: "file", "memory", or "none"
    #[serde(default = "default_transcript_store")]
    pub store: String,

    /// Directory for transcript files (file store only)
    #[serde(default = "default_transcript_dir")]
    pub dir: PathBuf,
}

fn default_transcript_store() -> String {
    "file".into()
}
fn default_transcript_dir() -> PathBuf {
    AppConfig::config_dir().join("transcripts")
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            store: default_transcript_store(),
            dir: default_transcript_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Chance of replying to a follow-up message that does not name the bot
    #[serde(default = "default_followup_chance")]
    pub followup_chance: f64,

    /// Poisson rate for extra replies per trigger (0 = always exactly one)
    #[serde(default = "default_reply_rate")]
    pub reply_rate: f64,

    /// Hard cap on replies per trigger
    #[serde(default = "default_max_burst")]
    pub max_burst: usize,
}

fn default_followup_chance() -> f64 {
    0.33
}
fn default_reply_rate() -> f64 {
    0.25
}
fn default_max_burst() -> usize {
    4
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            followup_chance: default_followup_chance(),
            reply_rate: default_reply_rate(),
            max_burst: default_max_burst(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DiscordSection {
    /// Bot token; usually supplied via PALAVER_DISCORD_TOKEN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
}

impl std::fmt::Debug for DiscordSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSection")
            .field("bot_token", &redact(&self.bot_token))
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.palaver/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PALAVER_API_KEY` / `OPENAI_API_KEY` for the remote engine key
    /// - `PALAVER_ENGINE` to override the engine kind
    /// - `PALAVER_MODEL` to override the remote model
    /// - `PALAVER_DISCORD_TOKEN` for the Discord adapter
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = Self::config_dir();
        let config_path = config_dir.join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("PALAVER_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(kind) = std::env::var("PALAVER_ENGINE") {
            config.engine.kind = kind;
        }

        if let Ok(model) = std::env::var("PALAVER_MODEL") {
            config.engine.remote.model = model;
        }

        if config.discord.bot_token.is_none() {
            config.discord.bot_token = std::env::var("PALAVER_DISCORD_TOKEN").ok();
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".palaver")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.engine.kind.as_str() {
            "remote" | "local" | "scripted" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "engine.kind must be \"remote\", \"local\", or \"scripted\", got \"{other}\""
                )));
            }
        }

        if self.engine.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_concurrent must be at least 1".into(),
            ));
        }

        let sampling = self.sampling.resolve()?;
        if sampling.temperature < 0.0 || sampling.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "sampling temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if sampling.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "sampling max_tokens must be at least 1".into(),
            ));
        }
        if self.engine.kind == "remote" && sampling.max_tokens >= self.engine.remote.context_length
        {
            return Err(ConfigError::ValidationError(
                "sampling max_tokens must leave room for input within engine.remote.context_length"
                    .into(),
            ));
        }

        match self.transcript.store.as_str() {
            "file" | "memory" | "none" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "transcript.store must be \"file\", \"memory\", or \"none\", got \"{other}\""
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.behavior.followup_chance) {
            return Err(ConfigError::ValidationError(
                "behavior.followup_chance must be between 0.0 and 1.0".into(),
            ));
        }
        if self.behavior.reply_rate < 0.0 {
            return Err(ConfigError::ValidationError(
                "behavior.reply_rate must not be negative".into(),
            ));
        }
        if self.behavior.max_burst == 0 {
            return Err(ConfigError::ValidationError(
                "behavior.max_burst must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.engine.remote.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            persona: PersonaConfig::default(),
            engine: EngineConfig::default(),
            sampling: SamplingConfig::default(),
            safety: SafetyConfig::default(),
            transcript: TranscriptConfig::default(),
            behavior: BehaviorConfig::default(),
            discord: DiscordSection::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.engine.kind, "remote");
        assert_eq!(config.engine.max_concurrent, 1);
        assert_eq!(config.persona.name, "Palaver");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.engine.kind, config.engine.kind);
        assert_eq!(parsed.persona.name, config.persona.name);
        assert_eq!(
            parsed.engine.remote.context_length,
            config.engine.remote.context_length
        );
    }

    #[test]
    fn invalid_engine_kind_rejected() {
        let mut config = AppConfig::default();
        config.engine.kind = "quantum".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.sampling.temperature = Some(5.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_output_budget_rejected() {
        let mut config = AppConfig::default();
        config.sampling.max_tokens = Some(config.engine.remote.context_length);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.engine.kind, "remote");
    }

    #[test]
    fn load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[persona]\nname = \"Sprocket\"").unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.persona.name, "Sprocket");
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "persona = \"not a table\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("Palaver"));
        assert!(toml_str.contains("localhost:8080"));
    }

    #[test]
    fn sampling_preset_mellow() {
        let config = SamplingConfig {
            preset: Some("mellow".into()),
            ..SamplingConfig::default()
        };
        let params = config.resolve().unwrap();
        assert!((params.temperature - 0.7).abs() < f64::EPSILON);
        assert!((params.repeat_penalty - 1.1).abs() < f32::EPSILON);
    }

    #[test]
    fn sampling_overrides_beat_preset() {
        let config = SamplingConfig {
            preset: Some("mellow".into()),
            temperature: Some(1.5),
            max_tokens: Some(64),
            ..SamplingConfig::default()
        };
        let params = config.resolve().unwrap();
        assert!((params.temperature - 1.5).abs() < f64::EPSILON);
        assert_eq!(params.max_tokens, 64);
        assert_eq!(params.top_p, Some(0.9));
    }

    #[test]
    fn unknown_sampling_preset_rejected() {
        let config = SamplingConfig {
            preset: Some("chaotic".into()),
            ..SamplingConfig::default()
        };
        assert!(config.resolve().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-secret-key".into());
        config.discord.bot_token = Some("bot-token".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-key"));
        assert!(!debug.contains("bot-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parses_partial_config() {
        let toml_str = r#"
[persona]
name = "Gossip"

[engine]
kind = "scripted"

[sampling]
preset = "wild"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.persona.name, "Gossip");
        assert_eq!(config.engine.kind, "scripted");
        let params = config.sampling.resolve().unwrap();
        assert!(params.temperature > 1.0);
        // Untouched sections fall back to defaults
        assert_eq!(config.engine.remote.context_length, 2048);
        assert!(config.safety.enabled);
    }
}
