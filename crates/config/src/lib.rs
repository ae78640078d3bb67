//! Configuration loading, validation, and management for Scout.
//!
//! Loads configuration from `~/.scout/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.scout/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM and speech endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider: "openai", "openrouter", "ollama" or "custom"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL override (required for "custom")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per LLM response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub voice: VoiceConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4.1-mini-2025-04-14".into()
}
fn default_temperature() -> f32 {
    0.7
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
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("store", &self.store)
            .field("checkpoint", &self.checkpoint)
            .field("voice", &self.voice)
            .finish()
    }
}

/// Assistant persona and control-loop limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Template with `{name}`, `{customer_id}`, `{date}` and `{categories}`
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Tool rounds allowed per turn; 0 means unbounded
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Customer the session acts for when none is given
    #[serde(default = "default_customer_id")]
    pub customer_id: String,

    /// Inputs that end an interactive session
    #[serde(default = "default_exit_phrases")]
    pub exit_phrases: Vec<String>,
}

fn default_agent_name() -> String {
    "Scout".into()
}
fn default_system_prompt() -> String {
    "You are {name}, a helpful expense manager. \
     The active customer_id is {customer_id}. Today is {date}. \
     Valid expense categories: {categories}. \
     Use the tools to create, list, update and delete expenses; \
     never invent expense ids."
        .into()
}
fn default_max_tool_rounds() -> usize {
    25
}
fn default_customer_id() -> String {
    "default".into()
}
fn default_exit_phrases() -> Vec<String> {
    vec!["exit".into(), "quit".into()]
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: default_system_prompt(),
            max_tool_rounds: default_max_tool_rounds(),
            customer_id: default_customer_id(),
            exit_phrases: default_exit_phrases(),
        }
    }
}

impl AgentSettings {
    /// Whether `input` is one of the configured exit phrases.
    pub fn is_exit_phrase(&self, input: &str) -> bool {
        let input = input.trim();
        self.exit_phrases
            .iter()
            .any(|p| p.eq_ignore_ascii_case(input))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory", "sqlite" or "postgres"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    #[serde(default = "default_store_path")]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_store_path() -> String {
    AppConfig::config_dir()
        .join("expenses.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_checkpoint_backend")]
    pub backend: String,

    #[serde(default = "default_checkpoint_path")]
    pub path: String,
}

fn default_checkpoint_backend() -> String {
    "memory".into()
}
fn default_checkpoint_path() -> String {
    AppConfig::config_dir()
        .join("checkpoints.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: default_checkpoint_backend(),
            path: default_checkpoint_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// Delivery instructions passed to the speech model
    #[serde(default = "default_voice_instructions")]
    pub instructions: String,

    /// Capture rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Rate of the synthesized PCM stream in Hz
    #[serde(default = "default_playback_sample_rate")]
    pub playback_sample_rate: u32,

    /// Recorder writing raw s16le mono PCM to stdout; `{rate}` is substituted
    #[serde(default = "default_record_command")]
    pub record_command: Vec<String>,

    /// Player reading raw s16le mono PCM from stdin; `{rate}` is substituted
    #[serde(default = "default_play_command")]
    pub play_command: Vec<String>,
}

fn default_stt_model() -> String {
    "whisper-1".into()
}
fn default_tts_model() -> String {
    "gpt-4o-mini-tts".into()
}
fn default_voice() -> String {
    "coral".into()
}
fn default_voice_instructions() -> String {
    "Speak in a warm, friendly and concise tone.".into()
}
fn default_sample_rate() -> u32 {
    16_000
}
fn default_playback_sample_rate() -> u32 {
    24_000
}
fn default_record_command() -> Vec<String> {
    ["arecord", "-q", "-t", "raw", "-f", "S16_LE", "-c", "1", "-r", "{rate}"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_play_command() -> Vec<String> {
    ["aplay", "-q", "-t", "raw", "-f", "S16_LE", "-c", "1", "-r", "{rate}"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_model: default_stt_model(),
            tts_model: default_tts_model(),
            voice: default_voice(),
            instructions: default_voice_instructions(),
            sample_rate: default_sample_rate(),
            playback_sample_rate: default_playback_sample_rate(),
            record_command: default_record_command(),
            play_command: default_play_command(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.scout/config.toml).
    ///
    /// Environment overrides:
    /// - `SCOUT_API_KEY`, then `OPENAI_API_KEY`, then `OPENROUTER_API_KEY`
    /// - `SCOUT_PROVIDER`, `SCOUT_MODEL`, `SCOUT_CUSTOMER_ID`, `SCOUT_DATABASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
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

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("SCOUT_API_KEY")
            .or_else(|| self.api_key.clone())
            .or_else(|| lookup("OPENAI_API_KEY"))
            .or_else(|| lookup("OPENROUTER_API_KEY"))
        {
            self.api_key = Some(key);
        }

        if let Some(provider) = lookup("SCOUT_PROVIDER") {
            self.provider = provider;
        }

        if let Some(model) = lookup("SCOUT_MODEL") {
            self.model = model;
        }

        if let Some(customer_id) = lookup("SCOUT_CUSTOMER_ID") {
            self.agent.customer_id = customer_id;
        }

        if let Some(url) = lookup("SCOUT_DATABASE_URL") {
            if url.starts_with("postgres") {
                self.store.backend = "postgres".into();
                self.store.url = Some(url);
            } else {
                self.store.backend = "sqlite".into();
                self.store.path = url;
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".scout")
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        if self.agent.customer_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.customer_id must not be empty".into(),
            ));
        }

        match self.store.backend.as_str() {
            "memory" | "sqlite" => {}
            "postgres" if self.store.url.is_some() => {}
            "postgres" => {
                return Err(ConfigError::ValidationError(
                    "store.url is required for the postgres backend".into(),
                ));
            }
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown store backend '{other}'"
                )));
            }
        }

        if !matches!(self.checkpoint.backend.as_str(), "memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "unknown checkpoint backend '{}'",
                self.checkpoint.backend
            )));
        }

        if self.voice.sample_rate == 0 || self.voice.playback_sample_rate == 0 {
            return Err(ConfigError::ValidationError(
                "voice sample rates must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            agent: AgentSettings::default(),
            store: StoreConfig::default(),
            checkpoint: CheckpointConfig::default(),
            voice: VoiceConfig::default(),
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
