//! Shared reqwest plumbing for the HTTP model backends.

use std::time::Duration;

use switchyard_config::ModelConfig;
use switchyard_core::ModelError;
use tracing::warn;

/// Build a client with the configured connect and read timeouts.
pub fn build_client(config: &ModelConfig) -> Result<reqwest::Client, ModelError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.read_timeout_secs))
        .build()
        .map_err(|e| ModelError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Classify a transport error so the retry layer can tell timeouts apart.
pub fn transport_error(err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout(err.to_string())
    } else {
        ModelError::Network(err.to_string())
    }
}

/// Turn a non-2xx response into [`ModelError::Status`].
pub async fn status_error(backend: &str, response: reqwest::Response) -> ModelError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    warn!(backend, status, body = %body, "Model backend returned error");
    ModelError::Status {
        status_code: status,
        message: body,
    }
}
