//! Ollama backend.
//!
//! Talks to the native Ollama API:
//! - `POST /api/generate` (non-streaming) for text generation
//! - `POST /api/embeddings` for embeddings
//! - `GET /api/tags` for model listing and the availability probe

use async_trait::async_trait;
use serde::Deserialize;
use switchyard_config::ModelConfig;
use switchyard_core::{GenerateRequest, ModelBackend, ModelError};
use tracing::debug;

use crate::http::{build_client, status_error, transport_error};

pub struct OllamaBackend {
    base_url: String,
    model: String,
    embedding_model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaBackend {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            client: build_client(config)?,
        })
    }

    fn generate_body(&self, request: &GenerateRequest) -> serde_json::Value {
        let mut options = serde_json::json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = serde_json::json!(max_tokens);
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": options,
        });
        if let Some(system) = &request.system {
            body["system"] = serde_json::json!(system);
        }
        body
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, "Sending generate request");

        let response = self
            .client
            .post(&url)
            .json(&self.generate_body(request))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(ModelError::InvalidResponse("Empty response from model".into()));
        }
        Ok(text)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::json!({ "model": self.embedding_model, "prompt": text });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            ModelError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;
        if parsed.embedding.is_empty() {
            return Err(ModelError::InvalidResponse("Empty embedding".into()));
        }
        Ok(parsed.embedding)
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> Result<bool, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;

    fn config(base_url: String) -> ModelConfig {
        ModelConfig {
            base_url,
            read_timeout_secs: 5,
            connect_timeout_secs: 2,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn generate_body_includes_options() {
        let backend = OllamaBackend::from_config(&ModelConfig::default()).unwrap();
        let req = GenerateRequest::new("hello")
            .with_system("be brief")
            .with_temperature(0.3)
            .with_max_tokens(128);
        let body = backend.generate_body(&req);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["options"]["num_predict"], 128);
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend = OllamaBackend::from_config(&config("http://localhost:11434/".into())).unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn generate_parses_response_field() {
        let url = test_server::serve(200, r#"{"model":"llama3.2","response":"  Sunny in Lisbon. ","done":true}"#).await;
        let backend = OllamaBackend::from_config(&config(url)).unwrap();
        let text = backend.generate(&GenerateRequest::new("weather")).await.unwrap();
        assert_eq!(text, "Sunny in Lisbon.");
    }

    #[tokio::test]
    async fn server_error_maps_to_retryable_status() {
        let url = test_server::serve(503, r#"{"error":"loading model"}"#).await;
        let backend = OllamaBackend::from_config(&config(url)).unwrap();
        let err = backend.generate(&GenerateRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, ModelError::Status { status_code: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn list_models_reads_tags() {
        let url = test_server::serve(200, r#"{"models":[{"name":"llama3.2:latest"},{"name":"nomic-embed-text"}]}"#).await;
        let backend = OllamaBackend::from_config(&config(url)).unwrap();
        let models = backend.list_models().await.unwrap();
        assert_eq!(models, vec!["llama3.2:latest", "nomic-embed-text"]);
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let url = test_server::closed_port().await;
        let backend = OllamaBackend::from_config(&config(url)).unwrap();
        let err = backend.health_check().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
