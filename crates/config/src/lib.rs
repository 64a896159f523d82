//! Configuration loading, validation, and management for Switchyard.
//!
//! Loads configuration from `~/.switchyard/config.toml` with environment
//! variable overrides. Validates all settings at startup. The provider
//! registry lives in its own file, see [`registry::RegistryFile`].

pub mod registry;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use registry::{RegistryFile, RegistrySettings};

/// The root configuration structure.
///
/// Maps directly to `~/.switchyard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// External language model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Router scoring weights and thresholds
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Chat deadline and batch budget
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Provider registry file. Defaults to `~/.switchyard/providers.toml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_file: Option<PathBuf>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "ollama" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_model_backend")]
    pub backend: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model_name")]
    pub model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Budget for the cheap availability probe.
    #[serde(default = "default_availability_timeout")]
    pub availability_timeout_secs: u64,

    /// Extra attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay; attempt `n` waits `retry_delay_secs * 2^n`.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model_backend() -> String {
    "ollama".into()
}
fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model_name() -> String {
    "llama3.2".into()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_read_timeout() -> u64 {
    30
}
fn default_availability_timeout() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> f64 {
    2.0
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_model_backend(),
            base_url: default_base_url(),
            model: default_model_name(),
            embedding_model: default_embedding_model(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            availability_timeout_secs: default_availability_timeout(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("api_key", &redact(&self.api_key))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("availability_timeout_secs", &self.availability_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite", "file", "memory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Database file or directory for the durable tier.
    /// Defaults to `~/.switchyard/memory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_ttl")]
    pub stm_ttl_secs: u64,

    #[serde(default = "default_ttl")]
    pub session_idle_secs: u64,

    /// Idle sessions older than this are dropped, summaries included.
    #[serde(default = "default_session_retention")]
    pub session_retention_secs: u64,

    /// Window for the per-user recency index.
    #[serde(default = "default_ttl")]
    pub recent_window_secs: u64,

    /// "hashing", "model" or "none"
    #[serde(default = "default_embedder")]
    pub embedder: String,

    /// Dimensions of the local hashing embedder.
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,

    #[serde(default = "default_top_k")]
    pub similarity_top_k: usize,

    /// Session turns attached to each query as context.
    #[serde(default = "default_context_turns")]
    pub session_context_turns: usize,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_ttl() -> u64 {
    3600
}
fn default_session_retention() -> u64 {
    86_400
}
fn default_embedder() -> String {
    "hashing".into()
}
fn default_embedding_dims() -> usize {
    256
}
fn default_top_k() -> usize {
    5
}
fn default_context_turns() -> usize {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
            stm_ttl_secs: default_ttl(),
            session_idle_secs: default_ttl(),
            session_retention_secs: default_session_retention(),
            recent_window_secs: default_ttl(),
            embedder: default_embedder(),
            embedding_dims: default_embedding_dims(),
            similarity_top_k: default_top_k(),
            session_context_turns: default_context_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    #[serde(default = "default_capability_weight")]
    pub capability_weight: f32,

    #[serde(default = "default_memory_weight")]
    pub memory_weight: f32,

    /// Look-back for the memory-context bonus.
    #[serde(default = "default_recent_hours")]
    pub recent_hours: i64,

    /// At or above this top score the router goes single-provider.
    #[serde(default = "default_high_confidence")]
    pub high_confidence_threshold: f32,

    #[serde(default)]
    pub model_rerank: bool,

    #[serde(default = "default_model_bonus")]
    pub model_bonus: f32,

    /// Let the model introduce providers that scored zero.
    #[serde(default)]
    pub allow_model_new_candidates: bool,

    /// How long a chat query may wait on the re-ranking call.
    #[serde(default = "default_rerank_budget")]
    pub rerank_budget_ms: u64,
}

fn default_keyword_weight() -> f32 {
    1.0
}
fn default_capability_weight() -> f32 {
    0.5
}
fn default_memory_weight() -> f32 {
    0.25
}
fn default_recent_hours() -> i64 {
    6
}
fn default_high_confidence() -> f32 {
    3.0
}
fn default_model_bonus() -> f32 {
    2.0
}
fn default_rerank_budget() -> u64 {
    500
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_keyword_weight(),
            capability_weight: default_capability_weight(),
            memory_weight: default_memory_weight(),
            recent_hours: default_recent_hours(),
            high_confidence_threshold: default_high_confidence(),
            model_rerank: false,
            model_bonus: default_model_bonus(),
            allow_model_new_candidates: false,
            rerank_budget_ms: default_rerank_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Soft deadline for interactive queries.
    #[serde(default = "default_chat_deadline")]
    pub chat_deadline_ms: u64,

    /// Overall budget for batch queries; overruns are logged.
    #[serde(default = "default_batch_budget")]
    pub batch_budget_secs: u64,

    /// Provider cap in batch mode (chat uses the registry's `max_selected`).
    #[serde(default = "default_batch_max")]
    pub batch_max_providers: usize,

    /// Per-section truncation in chat responses.
    #[serde(default = "default_section_chars")]
    pub chat_section_chars: usize,

    /// Per-section truncation in batch responses (0 = unlimited).
    #[serde(default)]
    pub batch_section_chars: usize,

    /// How long a chat response may wait on the model-written summary
    /// before falling back to first sentences.
    #[serde(default = "default_summary_budget")]
    pub summary_budget_ms: u64,
}

fn default_chat_deadline() -> u64 {
    3000
}
fn default_batch_budget() -> u64 {
    300
}
fn default_batch_max() -> usize {
    6
}
fn default_section_chars() -> usize {
    200
}
fn default_summary_budget() -> u64 {
    1000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            chat_deadline_ms: default_chat_deadline(),
            batch_budget_secs: default_batch_budget(),
            batch_max_providers: default_batch_max(),
            chat_section_chars: default_section_chars(),
            batch_section_chars: 0,
            summary_budget_ms: default_summary_budget(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchyard/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `SWITCHYARD_MODEL_URL`, `SWITCHYARD_MODEL`
    /// - `SWITCHYARD_API_KEY` (only when the file has none)
    /// - `SWITCHYARD_PROVIDERS_FILE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
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

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SWITCHYARD_MODEL_URL") {
            self.model.base_url = url;
        }
        if let Ok(model) = std::env::var("SWITCHYARD_MODEL") {
            self.model.model = model;
        }
        if self.model.api_key.is_none() {
            self.model.api_key = std::env::var("SWITCHYARD_API_KEY").ok();
        }
        if let Ok(path) = std::env::var("SWITCHYARD_PROVIDERS_FILE") {
            self.registry_file = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchyard")
    }

    /// Resolved path of the provider registry file.
    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("providers.toml"))
    }

    /// Resolved location of the durable memory tier.
    pub fn memory_path(&self) -> PathBuf {
        self.memory
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("memory"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.model.backend.as_str(), "ollama" | "openai") {
            return Err(ConfigError::ValidationError(format!(
                "model.backend must be \"ollama\" or \"openai\", got \"{}\"",
                self.model.backend
            )));
        }

        if self.model.retry_delay_secs < 0.0 {
            return Err(ConfigError::ValidationError(
                "model.retry_delay_secs must be >= 0".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "sqlite" | "file" | "memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be one of sqlite, file, memory, none; got \"{}\"",
                self.memory.backend
            )));
        }

        if !matches!(self.memory.embedder.as_str(), "hashing" | "model" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "memory.embedder must be one of hashing, model, none; got \"{}\"",
                self.memory.embedder
            )));
        }

        if self.memory.stm_ttl_secs == 0 || self.memory.session_idle_secs == 0 {
            return Err(ConfigError::ValidationError(
                "memory TTLs must be > 0".into(),
            ));
        }

        if self.memory.session_retention_secs < self.memory.session_idle_secs {
            return Err(ConfigError::ValidationError(
                "memory.session_retention_secs must be >= memory.session_idle_secs".into(),
            ));
        }

        if self.memory.embedding_dims == 0 {
            return Err(ConfigError::ValidationError(
                "memory.embedding_dims must be > 0".into(),
            ));
        }

        let r = &self.routing;
        if r.keyword_weight < 0.0
            || r.capability_weight < 0.0
            || r.memory_weight < 0.0
            || r.model_bonus < 0.0
        {
            return Err(ConfigError::ValidationError(
                "routing weights must be >= 0".into(),
            ));
        }

        if r.high_confidence_threshold <= 0.0 {
            return Err(ConfigError::ValidationError(
                "routing.high_confidence_threshold must be > 0".into(),
            ));
        }

        if self.execution.chat_deadline_ms == 0 || self.execution.batch_budget_secs == 0 {
            return Err(ConfigError::ValidationError(
                "execution deadlines must be > 0".into(),
            ));
        }

        if self.execution.batch_max_providers == 0 {
            return Err(ConfigError::ValidationError(
                "execution.batch_max_providers must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for switchyard_core::Error {
    fn from(err: ConfigError) -> Self {
        switchyard_core::Error::Config {
            message: err.to_string(),
        }
    }
}
