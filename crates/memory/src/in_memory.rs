//! In-memory history backend: useful for testing and ephemeral runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchyard_core::{EmbeddingRecord, HistoryBackend, HistoryFilter, InteractionRecord, MemoryError, ProviderNote};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    interactions: Vec<InteractionRecord>,
    embeddings: Vec<EmbeddingRecord>,
    notes: Vec<ProviderNote>,
}

/// Append-only vectors behind a lock. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryHistory {
    tables: RwLock<Tables>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Common accessors for the filterable record types.
pub(crate) trait Keyed {
    fn user_id(&self) -> &str;
    fn provider_id(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Keyed for InteractionRecord {
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn provider_id(&self) -> &str {
        &self.provider_id
    }
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Keyed for EmbeddingRecord {
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn provider_id(&self) -> &str {
        &self.provider_id
    }
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Newest-first filtered copy, honouring the filter's limit.
pub(crate) fn select<T: Keyed + Clone>(rows: &[T], filter: &HistoryFilter, user_id: &str) -> Vec<T> {
    rows.iter()
        .rev()
        .filter(|r| r.user_id() == user_id && filter.admits(r.provider_id(), r.timestamp()))
        .take(filter.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Replace the note in the same slot, keeping the vector in update order.
pub(crate) fn upsert_note(notes: &mut Vec<ProviderNote>, note: ProviderNote) {
    notes.retain(|n| !n.same_slot(&note));
    notes.push(note);
}

pub(crate) fn select_notes(notes: &[ProviderNote], provider_id: &str, user_id: Option<&str>, limit: usize) -> Vec<ProviderNote> {
    notes
        .iter()
        .rev()
        .filter(|n| n.provider_id == provider_id && user_id.is_none_or(|u| n.user_id == u))
        .take(limit)
        .cloned()
        .collect()
}

#[async_trait]
impl HistoryBackend for InMemoryHistory {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append_interaction(&self, mut record: InteractionRecord) -> Result<u64, MemoryError> {
        let mut tables = self.tables.write().await;
        record.seq = tables.interactions.len() as u64 + 1;
        let seq = record.seq;
        tables.interactions.push(record);
        Ok(seq)
    }

    async fn interactions(&self, user_id: &str, filter: &HistoryFilter) -> Result<Vec<InteractionRecord>, MemoryError> {
        let tables = self.tables.read().await;
        Ok(select(&tables.interactions, filter, user_id))
    }

    async fn append_embedding(&self, mut record: EmbeddingRecord) -> Result<u64, MemoryError> {
        let mut tables = self.tables.write().await;
        record.seq = tables.embeddings.len() as u64 + 1;
        let seq = record.seq;
        tables.embeddings.push(record);
        Ok(seq)
    }

    async fn embeddings(&self, user_id: &str, filter: &HistoryFilter) -> Result<Vec<EmbeddingRecord>, MemoryError> {
        let tables = self.tables.read().await;
        Ok(select(&tables.embeddings, filter, user_id))
    }

    async fn put_note(&self, note: ProviderNote) -> Result<(), MemoryError> {
        upsert_note(&mut self.tables.write().await.notes, note);
        Ok(())
    }

    async fn notes(&self, provider_id: &str, user_id: Option<&str>, limit: usize) -> Result<Vec<ProviderNote>, MemoryError> {
        let tables = self.tables.read().await;
        Ok(select_notes(&tables.notes, provider_id, user_id, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assigns_sequence_and_reads_newest_first() {
        let h = InMemoryHistory::new();
        assert_eq!(h.append_interaction(InteractionRecord::new("u1", "A", "q1", "r1")).await.unwrap(), 1);
        assert_eq!(h.append_interaction(InteractionRecord::new("u1", "B", "q2", "r2")).await.unwrap(), 2);
        h.append_interaction(InteractionRecord::new("u2", "A", "q3", "r3")).await.unwrap();

        let all = h.interactions("u1", &HistoryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].input, "q2");

        let only_a = h.interactions("u1", &HistoryFilter::provider("A")).await.unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].output, "r1");
    }

    #[tokio::test]
    async fn notes_upsert_per_slot() {
        let h = InMemoryHistory::new();
        h.put_note(ProviderNote::new("DiningAgent", "u1", "diet", "vegetarian")).await.unwrap();
        h.put_note(ProviderNote::new("DiningAgent", "u2", "diet", "none")).await.unwrap();
        h.put_note(ProviderNote::new("DiningAgent", "u1", "budget", "low")).await.unwrap();
        h.put_note(ProviderNote::new("DiningAgent", "u1", "diet", "vegan")).await.unwrap();

        let mine = h.notes("DiningAgent", Some("u1"), 10).await.unwrap();
        let pairs: Vec<_> = mine.iter().map(|n| (n.key.as_str(), n.value.as_str())).collect();
        assert_eq!(pairs, vec![("diet", "vegan"), ("budget", "low")]);
        assert_eq!(h.notes("DiningAgent", None, 10).await.unwrap().len(), 3);
        assert_eq!(h.notes("DiningAgent", None, 1).await.unwrap().len(), 1);
        assert!(h.notes("WeatherAgent", None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn limit_is_applied_after_filtering() {
        let h = InMemoryHistory::new();
        for i in 0..5 {
            h.append_interaction(InteractionRecord::new("u1", "A", format!("q{i}"), "r")).await.unwrap();
        }
        let filter = HistoryFilter {
            limit: Some(2),
            ..HistoryFilter::default()
        };
        let rows = h.interactions("u1", &filter).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.input.as_str()).collect::<Vec<_>>(), vec!["q4", "q3"]);
    }
}
