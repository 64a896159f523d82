//! Language-model access for Switchyard.
//!
//! Backends implement `switchyard_core::ModelBackend` and make exactly one
//! attempt per call. [`ResilientModelClient`] layers retries, backoff and the
//! [`OfflineResponder`] on top, so callers always get text back.

pub mod embedder;
pub mod http;
pub mod offline;
pub mod ollama;
pub mod openai_compat;
pub mod resilient;

use std::sync::Arc;

use switchyard_config::ModelConfig;
use switchyard_core::{ModelBackend, ModelError};

pub use embedder::ModelEmbedder;
pub use offline::{OfflineResponder, Topic};
pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use resilient::{ClientState, ResilientModelClient, RetryPolicy};

/// Build the configured backend ("ollama" or "openai").
pub fn backend_from_config(config: &ModelConfig) -> Result<Arc<dyn ModelBackend>, ModelError> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaBackend::from_config(config)?)),
        "openai" => Ok(Arc::new(OpenAiCompatBackend::from_config(config)?)),
        other => Err(ModelError::NotConfigured(format!("unknown model backend '{other}'"))),
    }
}

/// Build the resilient client; an unusable backend yields an offline-only client.
pub fn client_from_config(config: &ModelConfig) -> ResilientModelClient {
    match backend_from_config(config) {
        Ok(backend) => ResilientModelClient::from_config(backend, config),
        Err(e) => {
            tracing::warn!(error = %e, "Model backend unavailable, running offline");
            ResilientModelClient::offline_only()
        }
    }
}
