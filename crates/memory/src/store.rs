//! `MemoryStore`: the façade over every memory tier.
//!
//! Callers never see a storage error: failed reads come back empty, failed
//! writes are logged and dropped. Each tier keeps its own lock, so a slow
//! durable write does not block short-term reads.
//!
//! Expired short-term slots and sessions past their retention are purged
//! on the write path, at most once per [`PURGE_INTERVAL`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchyard_config::MemoryConfig;
use switchyard_core::{
    Embedder, EmbeddingRecord, ExecutionResult, HistoryBackend, HistoryFilter, InteractionRecord,
    ProviderNote, QueryContext, QueryMode, SimilarMatch, Turn,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::embedder::{HashingEmbedder, NoEmbedder};
use crate::file_backend::FileHistory;
use crate::in_memory::InMemoryHistory;
use crate::noop::NoopHistory;
use crate::sessions::{SessionInfo, SessionStore, SessionSummary};
use crate::short_term::{ShortTermCache, ShortTermRecord};
use crate::vector::rank_by_similarity;

/// Response preview length kept in embedding metadata.
const PREVIEW_CHARS: usize = 200;

/// Minimum gap between two purges triggered by writes.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Lifetime of the cached profile and digest slots.
const USER_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
const PROFILE_SLOT: &str = "profile";
const DIGEST_SLOT: &str = "digest";
const DIGEST_DAYS: i64 = 7;
const DIGEST_QUESTIONS: usize = 5;
const NOTES_LIMIT: usize = 50;

/// What one purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub short_term: usize,
    pub sessions: usize,
    pub user_cache: usize,
}

impl PurgeReport {
    pub fn total(&self) -> usize {
        self.short_term + self.sessions + self.user_cache
    }
}

/// JSON-serializable answer to "what have I asked about this before?".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySearch {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub similar: Vec<SimilarMatch>,
    pub recent_interactions: Vec<InteractionRecord>,
    pub total_matches: usize,
}

pub struct MemoryStore {
    short_term: ShortTermCache,
    /// Per-user profile and digest slots, kept apart from provider values.
    user_cache: ShortTermCache,
    sessions: SessionStore,
    last_purge: Mutex<Instant>,
    history: Arc<dyn HistoryBackend>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    recent_window: Duration,
    context_turns: usize,
}

impl MemoryStore {
    pub fn new(history: Arc<dyn HistoryBackend>, embedder: Arc<dyn Embedder>, config: &MemoryConfig) -> Self {
        Self {
            short_term: ShortTermCache::new(Duration::from_secs(config.stm_ttl_secs)),
            user_cache: ShortTermCache::new(USER_CACHE_TTL),
            sessions: SessionStore::new(
                Duration::from_secs(config.session_idle_secs),
                Duration::from_secs(config.session_retention_secs),
            ),
            last_purge: Mutex::new(Instant::now()),
            history,
            embedder,
            top_k: config.similarity_top_k.max(1),
            recent_window: Duration::from_secs(config.recent_window_secs),
            context_turns: config.session_context_turns,
        }
    }

    /// Ephemeral store with the hashing embedder.
    pub fn in_memory() -> Self {
        let config = MemoryConfig::default();
        Self::new(
            Arc::new(InMemoryHistory::new()),
            Arc::new(HashingEmbedder::new(config.embedding_dims)),
            &config,
        )
    }

    /// Build the configured backend and embedder.
    ///
    /// A backend that cannot be opened is replaced by the in-memory one, with
    /// a warning; `model_embedder` is used when `embedder = "model"`.
    pub async fn open(config: &MemoryConfig, path: &Path, model_embedder: Option<Arc<dyn Embedder>>) -> Self {
        let history: Arc<dyn HistoryBackend> = match config.backend.as_str() {
            "none" => Arc::new(NoopHistory),
            "memory" => Arc::new(InMemoryHistory::new()),
            "file" => Arc::new(FileHistory::new(path)),
            #[cfg(feature = "sqlite")]
            "sqlite" => match open_sqlite(path).await {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    warn!(error = %e, "SQLite history unavailable, using in-memory history");
                    Arc::new(InMemoryHistory::new())
                }
            },
            other => {
                warn!(backend = %other, "Unsupported memory backend, using in-memory history");
                Arc::new(InMemoryHistory::new())
            }
        };

        let embedder: Arc<dyn Embedder> = match config.embedder.as_str() {
            "hashing" => Arc::new(HashingEmbedder::new(config.embedding_dims)),
            "model" => model_embedder.unwrap_or_else(|| {
                warn!("Model embedder requested but not supplied; embeddings disabled");
                Arc::new(NoEmbedder)
            }),
            _ => Arc::new(NoEmbedder),
        };

        debug!(backend = history.name(), embedder = embedder.name(), "Memory store ready");
        Self::new(history, embedder, config)
    }

    pub fn backend_name(&self) -> &str {
        self.history.name()
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    // --- Short-term tier ---

    pub async fn set_stm(&self, user_id: &str, provider_id: &str, value: serde_json::Value, ttl: Option<Duration>) {
        self.short_term.set(user_id, provider_id, value, ttl).await;
    }

    pub async fn get_stm(&self, user_id: &str, provider_id: &str) -> Option<serde_json::Value> {
        self.short_term.get(user_id, provider_id).await
    }

    pub async fn all_stm_for_user(&self, user_id: &str) -> Vec<ShortTermRecord> {
        self.short_term.all_for_user(user_id).await
    }

    /// Live short-term values inside the recency window, most recent first.
    pub async fn recent_stm(&self, user_id: &str) -> Vec<ShortTermRecord> {
        self.short_term.recent(user_id, self.recent_window).await
    }

    /// Drop expired short-term slots, cached user slots and sessions past
    /// their retention.
    pub async fn purge_expired(&self) -> PurgeReport {
        let report = PurgeReport {
            short_term: self.short_term.purge_expired().await,
            sessions: self.sessions.purge_expired().await,
            user_cache: self.user_cache.purge_expired().await,
        };
        if report.total() > 0 {
            debug!(
                short_term = report.short_term,
                sessions = report.sessions,
                user_cache = report.user_cache,
                "Expired memory purged"
            );
        }
        report
    }

    /// Purge if the last purge is at least [`PURGE_INTERVAL`] old.
    async fn purge_if_due(&self) {
        {
            let now = Instant::now();
            let mut last = self.last_purge.lock().await;
            if now.duration_since(*last) < PURGE_INTERVAL {
                return;
            }
            *last = now;
        }
        self.purge_expired().await;
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    // --- Sessions ---

    pub async fn start_session(&self, user_id: &str, mode: QueryMode, title: Option<String>) -> SessionInfo {
        self.sessions.start(user_id, mode, title).await
    }

    pub async fn active_session(&self, user_id: &str) -> Option<SessionInfo> {
        self.sessions.active(user_id).await
    }

    pub async fn add_turn(&self, user_id: &str, role: &str, text: &str, mode: QueryMode) -> String {
        self.purge_if_due().await;
        self.sessions.add_turn(user_id, Turn::new(role, text), mode).await
    }

    /// Active-session turns, most recent first; `None` uses the configured depth.
    pub async fn session_context(&self, user_id: &str, limit: Option<usize>) -> Vec<Turn> {
        self.sessions
            .context(user_id, limit.unwrap_or(self.context_turns))
            .await
    }

    pub async fn end_session(&self, user_id: &str) -> Option<SessionInfo> {
        self.sessions.end(user_id).await
    }

    pub async fn session_summary(&self, session_id: &str) -> Option<SessionSummary> {
        self.sessions.summary(session_id).await
    }

    pub async fn sessions_for_user(&self, user_id: &str) -> Vec<SessionInfo> {
        self.sessions.sessions_for_user(user_id).await
    }

    // --- Long-term tier ---

    pub async fn store_ltm(&self, user_id: &str, provider_id: &str, input: &str, output: &str) -> Option<u64> {
        self.store_interaction(InteractionRecord::new(user_id, provider_id, input, output))
            .await
    }

    pub async fn store_interaction(&self, record: InteractionRecord) -> Option<u64> {
        let user = record.user_id.clone();
        let provider = record.provider_id.clone();
        match self.history.append_interaction(record).await {
            Ok(seq) => Some(seq),
            Err(e) => {
                warn!(user = %user, provider = %provider, error = %e, "Failed to store interaction");
                None
            }
        }
    }

    pub async fn ltm_by_user(&self, user_id: &str) -> Vec<InteractionRecord> {
        self.read_interactions(user_id, HistoryFilter::default()).await
    }

    pub async fn ltm_by_provider(&self, user_id: &str, provider_id: &str) -> Vec<InteractionRecord> {
        self.read_interactions(user_id, HistoryFilter::provider(provider_id))
            .await
    }

    /// Interactions from the last `days` days, newest first.
    pub async fn recent_ltm(&self, user_id: &str, days: i64) -> Vec<InteractionRecord> {
        self.recent_ltm_since(user_id, Utc::now() - chrono::Duration::days(days))
            .await
    }

    pub async fn recent_ltm_since(&self, user_id: &str, since: DateTime<Utc>) -> Vec<InteractionRecord> {
        self.read_interactions(user_id, HistoryFilter::since(since)).await
    }

    async fn read_interactions(&self, user_id: &str, filter: HistoryFilter) -> Vec<InteractionRecord> {
        self.history
            .interactions(user_id, &filter)
            .await
            .unwrap_or_else(|e| {
                warn!(user = %user_id, error = %e, "Failed to read interactions");
                Vec::new()
            })
    }

    // --- Provider notes ---

    /// Save a provider's note about a user, replacing the same key.
    pub async fn store_provider_note(
        &self,
        provider_id: &str,
        user_id: &str,
        key: &str,
        value: &str,
        metadata: serde_json::Value,
    ) -> bool {
        let mut note = ProviderNote::new(provider_id, user_id, key, value);
        note.metadata = metadata;
        match self.history.put_note(note).await {
            Ok(()) => true,
            Err(e) => {
                warn!(provider = %provider_id, user = %user_id, key = %key, error = %e, "Failed to store provider note");
                false
            }
        }
    }

    /// A provider's notes, most recently updated first; `user_id = None`
    /// spans every user and `limit = None` returns up to 50.
    pub async fn provider_notes(&self, provider_id: &str, user_id: Option<&str>, limit: Option<usize>) -> Vec<ProviderNote> {
        self.history
            .notes(provider_id, user_id, limit.unwrap_or(NOTES_LIMIT))
            .await
            .unwrap_or_else(|e| {
                warn!(provider = %provider_id, error = %e, "Failed to read provider notes");
                Vec::new()
            })
    }

    // --- Profile and digest ---

    /// Cache a user's profile for a week.
    pub async fn cache_profile(&self, user_id: &str, profile: serde_json::Value) {
        self.user_cache.set(user_id, PROFILE_SLOT, profile, None).await;
    }

    pub async fn profile(&self, user_id: &str) -> Option<serde_json::Value> {
        self.user_cache.get(user_id, PROFILE_SLOT).await
    }

    /// Activity over the last week: counts per provider, failures and the
    /// latest distinct questions. Cached until the user's next interaction.
    /// `None` when the user has no history in that window.
    pub async fn weekly_digest(&self, user_id: &str) -> Option<serde_json::Value> {
        if let Some(cached) = self.user_cache.get(user_id, DIGEST_SLOT).await {
            return Some(cached);
        }
        let digest = build_digest(&self.recent_ltm(user_id, DIGEST_DAYS).await)?;
        self.user_cache
            .set(user_id, DIGEST_SLOT, digest.clone(), None)
            .await;
        Some(digest)
    }

    // --- Embedding tier ---

    /// Embed `content` and append it. Skipped when the embedder is unavailable.
    pub async fn store_embedding(
        &self,
        user_id: &str,
        provider_id: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> Option<u64> {
        let vector = match self.embedder.embed(content).await {
            Ok(v) => v,
            Err(e) => {
                debug!(embedder = self.embedder.name(), error = %e, "Embedding skipped");
                return None;
            }
        };
        self.store_embedding_vector(user_id, provider_id, content, vector, metadata)
            .await
    }

    /// Append a precomputed vector.
    pub async fn store_embedding_vector(
        &self,
        user_id: &str,
        provider_id: &str,
        content: &str,
        vector: Vec<f32>,
        metadata: serde_json::Value,
    ) -> Option<u64> {
        let record = EmbeddingRecord {
            seq: 0,
            user_id: user_id.to_string(),
            provider_id: provider_id.to_string(),
            content: content.to_string(),
            vector,
            metadata,
            timestamp: Utc::now(),
        };
        match self.history.append_embedding(record).await {
            Ok(seq) => Some(seq),
            Err(e) => {
                warn!(user = %user_id, provider = %provider_id, error = %e, "Failed to store embedding");
                None
            }
        }
    }

    /// Top-K stored embeddings most similar to `text`.
    pub async fn similarity_search(
        &self,
        user_id: &str,
        text: &str,
        provider_id: Option<&str>,
        k: Option<usize>,
    ) -> Vec<SimilarMatch> {
        let query = match self.embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                debug!(embedder = self.embedder.name(), error = %e, "Similarity search skipped");
                return Vec::new();
            }
        };
        self.similarity_search_vector(user_id, &query, provider_id, k)
            .await
    }

    /// Top-K stored embeddings most similar to a precomputed vector.
    pub async fn similarity_search_vector(
        &self,
        user_id: &str,
        query: &[f32],
        provider_id: Option<&str>,
        k: Option<usize>,
    ) -> Vec<SimilarMatch> {
        let filter = HistoryFilter {
            provider_id: provider_id.map(str::to_string),
            ..HistoryFilter::default()
        };
        match self.history.embeddings(user_id, &filter).await {
            Ok(records) => rank_by_similarity(records, query, k.unwrap_or(self.top_k)),
            Err(e) => {
                warn!(user = %user_id, error = %e, "Failed to read embeddings");
                Vec::new()
            }
        }
    }

    /// Similar past queries plus the most recent interactions.
    pub async fn search_history(&self, user_id: &str, text: &str, provider_id: Option<&str>) -> HistorySearch {
        let similar = self.similarity_search(user_id, text, provider_id, None).await;
        let filter = HistoryFilter {
            provider_id: provider_id.map(str::to_string),
            since: None,
            limit: Some(self.top_k),
        };
        let recent_interactions = self.read_interactions(user_id, filter).await;
        HistorySearch {
            query: text.to_string(),
            timestamp: Utc::now(),
            total_matches: similar.len() + recent_interactions.len(),
            similar,
            recent_interactions,
        }
    }

    // --- Composite operations ---

    /// Record one finished provider interaction across every tier.
    pub async fn record_interaction(&self, user_id: &str, input: &str, result: &ExecutionResult, mode: QueryMode) {
        self.purge_if_due().await;
        let output = if result.success {
            result.response.clone()
        } else {
            format!("[error] {}", result.error.as_deref().unwrap_or("unknown failure"))
        };

        self.set_stm(
            user_id,
            &result.provider_id,
            serde_json::json!({
                "query": input,
                "response": output,
                "success": result.success,
                "latency_ms": result.latency.as_millis() as u64,
            }),
            None,
        )
        .await;

        let mut record = InteractionRecord::new(user_id, &result.provider_id, input, &output);
        record.success = result.success;
        self.store_interaction(record).await;
        self.user_cache.remove(user_id, DIGEST_SLOT).await;

        let preview: String = output.chars().take(PREVIEW_CHARS).collect();
        self.store_embedding(
            user_id,
            &result.provider_id,
            input,
            serde_json::json!({ "success": result.success, "response_preview": preview }),
        )
        .await;

        self.sessions
            .add_turn(user_id, Turn::new(format!("agent:{}", result.provider_id), output), mode)
            .await;
    }

    /// Session turns, recent short-term values, profile and weekly digest
    /// for a query.
    pub async fn query_context(&self, user_id: &str) -> QueryContext {
        let turns = self.session_context(user_id, None).await;
        let recent = self
            .recent_stm(user_id)
            .await
            .into_iter()
            .map(|r| (r.provider_id, r.value))
            .collect();
        QueryContext {
            turns,
            recent,
            profile: self.profile(user_id).await,
            digest: self.weekly_digest(user_id).await,
        }
    }
}

fn build_digest(interactions: &[InteractionRecord]) -> Option<serde_json::Value> {
    if interactions.is_empty() {
        return None;
    }
    let mut providers: BTreeMap<&str, usize> = BTreeMap::new();
    for record in interactions {
        *providers.entry(record.provider_id.as_str()).or_default() += 1;
    }
    let failures = interactions.iter().filter(|r| !r.success).count();
    let mut questions: Vec<&str> = Vec::new();
    for record in interactions {
        if questions.len() == DIGEST_QUESTIONS {
            break;
        }
        if !questions.contains(&record.input.as_str()) {
            questions.push(record.input.as_str());
        }
    }
    Some(serde_json::json!({
        "days": DIGEST_DAYS,
        "interactions": interactions.len(),
        "failures": failures,
        "providers": providers,
        "recent_questions": questions,
    }))
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(path: &Path) -> Result<crate::sqlite::SqliteHistory, switchyard_core::MemoryError> {
    let file = if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.join("history.db")
    };
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| switchyard_core::MemoryError::Storage(format!("Failed to create {}: {e}", parent.display())))?;
    }
    crate::sqlite::SqliteHistory::new(&format!("sqlite://{}", file.display())).await
}
