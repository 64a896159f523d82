//! Error types for the Switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them so callers that do not care about the origin can use `?`.

use thiserror::Error;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider implementation resolution ---
    #[error("Implementation error: {0}")]
    Implementation(#[from] ImplementationError),

    // --- Provider execution ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- External language model ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Memory ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Routing ---
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    // --- Registry ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure to turn a descriptor's implementation locator into a live provider.
#[derive(Debug, Clone, Error)]
pub enum ImplementationError {
    #[error("No implementation registered for locator '{locator}'")]
    Missing { locator: String },

    #[error("Locator '{locator}' exports several providers ({candidates}); symbol '{symbol}' is ambiguous")]
    Ambiguous {
        locator: String,
        symbol: String,
        candidates: String,
    },

    #[error("Provider '{id}' violates the provider contract: {reason}")]
    InvalidContract { id: String, reason: String },
}

/// Failure raised by a provider while answering a query.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider '{provider}' failed: {message}")]
    Failed { provider: String, message: String },

    #[error("Provider '{provider}' timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Provider '{provider}' abandoned: response deadline exceeded")]
    DeadlineExceeded { provider: String },

    #[error("Provider not found: {0}")]
    NotFound(String),

    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),
}

impl ProviderError {
    /// Convenience constructor for the common "failed with message" case.
    pub fn failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Failure of the external language-model dependency.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model API request failed: {message} (status: {status_code})")]
    Status { status_code: u16, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model backend not configured: {0}")]
    NotConfigured(String),

    #[error("Model unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable { attempts: u32, last_error: String },
}

impl ModelError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Transport failures, timeouts and transient server statuses are retried;
    /// client errors and malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Status { status_code, .. } => {
                matches!(status_code, 408 | 429 | 500 | 502 | 503 | 504)
            }
            Self::InvalidResponse(_) | Self::NotConfigured(_) | Self::Unavailable { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    #[error("No providers are loaded and no fallback provider is available")]
    Exhausted,
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Provider '{0}' is already registered")]
    DuplicateId(String),

    #[error("Provider not found: {0}")]
    NotFound(String),

    #[error("Failed to load provider '{id}': {source}")]
    Load {
        id: String,
        #[source]
        source: ImplementationError,
    },

    #[error("Provider '{0}' changed while it was being reloaded")]
    Superseded(String),

    #[error("Failed to persist registry file: {0}")]
    Persist(String),

    #[error("Failed to read registry file: {0}")]
    Read(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = Error::Model(ModelError::Status {
            status_code: 503,
            message: "Service Unavailable".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn retryable_classification() {
        assert!(ModelError::Timeout("read".into()).is_retryable());
        assert!(ModelError::Network("refused".into()).is_retryable());
        assert!(ModelError::Status { status_code: 429, message: String::new() }.is_retryable());
        assert!(!ModelError::Status { status_code: 404, message: String::new() }.is_retryable());
        assert!(!ModelError::InvalidResponse("not json".into()).is_retryable());
    }

    #[test]
    fn implementation_error_wraps_into_registry_error() {
        let err = RegistryError::Load {
            id: "WeatherAgent".into(),
            source: ImplementationError::Missing {
                locator: "builtin::weather".into(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("WeatherAgent"));
        assert!(text.contains("builtin::weather"));
    }
}
