//! No-op history backend: disables durable memory entirely.

use async_trait::async_trait;
use switchyard_core::{EmbeddingRecord, HistoryBackend, HistoryFilter, InteractionRecord, MemoryError, ProviderNote};

/// A backend that stores nothing and finds nothing.
pub struct NoopHistory;

#[async_trait]
impl HistoryBackend for NoopHistory {
    fn name(&self) -> &str { "none" }

    async fn append_interaction(&self, _record: InteractionRecord) -> Result<u64, MemoryError> {
        Ok(0)
    }

    async fn interactions(&self, _user_id: &str, _filter: &HistoryFilter) -> Result<Vec<InteractionRecord>, MemoryError> {
        Ok(Vec::new())
    }

    async fn append_embedding(&self, _record: EmbeddingRecord) -> Result<u64, MemoryError> {
        Ok(0)
    }

    async fn embeddings(&self, _user_id: &str, _filter: &HistoryFilter) -> Result<Vec<EmbeddingRecord>, MemoryError> {
        Ok(Vec::new())
    }

    async fn put_note(&self, _note: ProviderNote) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn notes(&self, _provider_id: &str, _user_id: Option<&str>, _limit: usize) -> Result<Vec<ProviderNote>, MemoryError> {
        Ok(Vec::new())
    }
}
