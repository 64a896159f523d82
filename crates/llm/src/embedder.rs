//! Model-backed embedder for the memory's embedding tier.

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{Embedder, MemoryError, ModelError};

use crate::resilient::ResilientModelClient;

/// Embeds text through the model backend's embedding endpoint.
pub struct ModelEmbedder {
    client: Arc<ResilientModelClient>,
}

impl ModelEmbedder {
    pub fn new(client: Arc<ResilientModelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Embedder for ModelEmbedder {
    fn name(&self) -> &str {
        "model"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.client.embed(text).await.map_err(|e| match e {
            ModelError::NotConfigured(msg) => MemoryError::EmbeddingUnavailable(msg),
            other if other.is_retryable() => MemoryError::EmbeddingUnavailable(other.to_string()),
            other => MemoryError::EmbeddingFailed(other.to_string()),
        })
    }
}
