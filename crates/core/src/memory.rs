//! Memory traits: durable interaction history and embeddings.
//!
//! The long-term tier is append-only: records are written once and never
//! mutated. Backends assign a per-store sequence number so that records with
//! identical timestamps still have a total order.
//!
//! Provider notes are the one keyed exception: a provider may remember a
//! value under `(provider, user, key)`, and writing the key again replaces it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// One recorded provider interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Assigned by the backend on append.
    #[serde(default)]
    pub seq: u64,
    pub user_id: String,
    pub provider_id: String,
    pub input: String,
    pub output: String,
    #[serde(default = "default_true")]
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl InteractionRecord {
    pub fn new(
        user_id: impl Into<String>,
        provider_id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            seq: 0,
            user_id: user_id.into(),
            provider_id: provider_id.into(),
            input: input.into(),
            output: output.into(),
            success: true,
            timestamp: Utc::now(),
        }
    }
}

/// One stored embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    #[serde(default)]
    pub seq: u64,
    pub user_id: String,
    pub provider_id: String,
    pub content: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A value a provider chose to remember about a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderNote {
    pub provider_id: String,
    pub user_id: String,
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl ProviderNote {
    pub fn new(
        provider_id: impl Into<String>,
        user_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            user_id: user_id.into(),
            key: key.into(),
            value: value.into(),
            metadata: serde_json::Value::Null,
            updated_at: Utc::now(),
        }
    }

    /// Whether `other` is stored under the same key.
    pub fn same_slot(&self, other: &ProviderNote) -> bool {
        self.provider_id == other.provider_id && self.user_id == other.user_id && self.key == other.key
    }
}

/// A similarity-search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub provider_id: String,
    pub content: String,
    pub similarity: f32,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Filter for history reads.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub provider_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn provider(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: Some(provider_id.into()),
            ..Self::default()
        }
    }

    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Self::default()
        }
    }

    /// Whether a record with these attributes passes the filter.
    pub fn admits(&self, provider_id: &str, timestamp: DateTime<Utc>) -> bool {
        self.provider_id.as_deref().is_none_or(|p| p == provider_id)
            && self.since.is_none_or(|s| timestamp >= s)
    }
}

/// The durable history backend.
///
/// Implementations: SQLite, JSON-lines files, in-memory (for testing), none (no-op).
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// The backend name (e.g., "sqlite", "file", "none").
    fn name(&self) -> &str;

    /// Append an interaction; returns the assigned sequence number.
    async fn append_interaction(&self, record: InteractionRecord) -> std::result::Result<u64, MemoryError>;

    /// Interactions for a user, newest first.
    async fn interactions(
        &self,
        user_id: &str,
        filter: &HistoryFilter,
    ) -> std::result::Result<Vec<InteractionRecord>, MemoryError>;

    /// Append an embedding; returns the assigned sequence number.
    async fn append_embedding(&self, record: EmbeddingRecord) -> std::result::Result<u64, MemoryError>;

    /// Embeddings for a user, newest first.
    async fn embeddings(
        &self,
        user_id: &str,
        filter: &HistoryFilter,
    ) -> std::result::Result<Vec<EmbeddingRecord>, MemoryError>;

    /// Insert or replace a provider note.
    async fn put_note(&self, note: ProviderNote) -> std::result::Result<(), MemoryError>;

    /// A provider's notes, optionally for one user, most recently updated first.
    async fn notes(
        &self,
        provider_id: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> std::result::Result<Vec<ProviderNote>, MemoryError>;
}

/// Turns text into a vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, MemoryError>;
}
