//! # Switchyard Core
//!
//! Domain types, traits, and error definitions for the Switchyard query
//! router. It pulls in no async runtime; its dependencies are serde,
//! serde_json, chrono, thiserror and async-trait. It defines the model that
//! all other crates implement against.
//!
//! Every seam is a trait here (providers, model backends, history backends,
//! embedders). Implementations live in their respective crates.

pub mod error;
pub mod memory;
pub mod model;
pub mod provider;
pub mod query;

// Re-export key types at crate root for ergonomics
pub use error::{
    Error, ImplementationError, MemoryError, ModelError, ProviderError, RegistryError, Result,
    RoutingError,
};
pub use memory::{
    Embedder, EmbeddingRecord, HistoryBackend, HistoryFilter, InteractionRecord, ProviderNote, SimilarMatch,
};
pub use model::{GenerateRequest, Generation, ModelBackend};
pub use provider::{CapabilityProvider, ExecutionSettings, ProviderDescriptor};
pub use query::{ExecutionResult, Query, QueryContext, QueryMode, RoutingDecision, Strategy, Turn};
