//! OpenAI-compatible backend.
//!
//! Works with OpenAI, OpenRouter, vLLM, LM Studio, Ollama's `/v1` shim and
//! any other endpoint exposing `/chat/completions`, `/embeddings`, `/models`.

use async_trait::async_trait;
use serde::Deserialize;
use switchyard_config::ModelConfig;
use switchyard_core::{GenerateRequest, ModelBackend, ModelError};
use tracing::debug;

use crate::http::{build_client, status_error, transport_error};

pub struct OpenAiCompatBackend {
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiCompatBackend {
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            api_key: config.api_key.clone(),
            client: build_client(config)?,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    fn chat_body(&self, request: &GenerateRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.prompt }));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "Sending completion request");

        let response = self
            .authorized(self.client.post(&url))
            .json(&self.chat_body(request))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ModelError::InvalidResponse("No content in response".into()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": [text],
            "encoding_format": "float",
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(status_error(self.name(), response).await);
        }

        let parsed: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ModelError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ModelError::InvalidResponse("No embedding in response".into()))
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<bool, ModelError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}
