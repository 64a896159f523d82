//! Model backend trait: the abstraction over the external language model.
//!
//! A backend performs exactly one attempt per call. Retries, backoff and the
//! offline fallback are layered on top by `switchyard-llm`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One text-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Text produced for a request, real or degraded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,

    /// True when the text came from the offline responder.
    pub degraded: bool,

    /// Attempts made against the backend (0 when it was skipped).
    pub attempts: u32,
}

/// The core ModelBackend trait.
///
/// Every model server (Ollama, OpenAI-compatible) implements this trait.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A human-readable name, e.g. "ollama".
    fn name(&self) -> &str;

    /// Single generation attempt.
    async fn generate(&self, request: &GenerateRequest) -> std::result::Result<String, ModelError>;

    /// Embed one text.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, ModelError> {
        Err(ModelError::NotConfigured(format!(
            "Backend '{}' does not support embeddings",
            self.name()
        )))
    }

    /// List available models.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ModelError> {
        Ok(Vec::new())
    }

    /// Cheap reachability check.
    async fn health_check(&self) -> std::result::Result<bool, ModelError> {
        Ok(true)
    }
}
