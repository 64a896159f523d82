//! Query routing.
//!
//! Scores every loaded provider against the query, then picks a strategy:
//!
//! 1. keyword hits × `keyword_weight`
//! 2. capability/description token overlap × `capability_weight`
//! 3. a memory bonus for providers the user relied on recently
//! 4. optionally, a bonus for providers the model suggests
//!
//! Steps 1 to 3 are deterministic for a given registry and memory state.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use switchyard_config::RoutingConfig;
use switchyard_core::{Query, QueryMode, RoutingDecision, RoutingError, Strategy};
use switchyard_llm::ResilientModelClient;
use switchyard_memory::MemoryStore;
use switchyard_registry::{ProviderHandle, ProviderRegistry};
use tracing::{debug, info};

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "what", "whats", "where", "when", "which", "who", "how", "are", "was", "were",
    "can", "could", "would", "should", "will", "you", "your", "about", "this", "that", "there", "some", "any",
    "from", "into", "like", "have", "has", "had", "not", "but", "all", "tell", "give", "want", "need", "please",
    "does", "did", "get", "its", "our", "out", "then", "than", "them", "they", "too", "very",
];

/// Minimum multi-provider score for inclusion.
const MULTI_MIN_SCORE: f32 = 1.0;

/// Lowercase alphanumeric tokens, in order.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tokens worth matching on: at least 3 characters, not a stop word.
fn significant(text: &str) -> BTreeSet<String> {
    words(&text.replace('\'', ""))
        .into_iter()
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Whole-word keyword hits. Single words also match a trailing plural `s`.
pub fn keyword_hits(keywords: &[String], text: &str) -> usize {
    let tokens = words(text);
    let padded = format!(" {} ", tokens.join(" "));
    keywords
        .iter()
        .filter(|keyword| {
            let kw = words(keyword);
            match kw.as_slice() {
                [] => false,
                [single] => tokens
                    .iter()
                    .any(|t| t == single || t.strip_suffix('s') == Some(single.as_str())),
                phrase => padded.contains(&format!(" {} ", phrase.join(" "))),
            }
        })
        .count()
}

/// Query tokens found among the capability and description tokens.
pub fn capability_overlap(handle: &ProviderHandle, text: &str) -> usize {
    let mut vocabulary = BTreeSet::new();
    for capability in handle.capabilities() {
        vocabulary.extend(significant(&capability.replace(['_', '-'], " ")));
    }
    vocabulary.extend(significant(handle.description()));
    significant(text).intersection(&vocabulary).count()
}

#[derive(Debug, Deserialize)]
struct ModelSuggestion {
    #[serde(default)]
    suggested_providers: Vec<String>,
}

pub struct Router {
    registry: Arc<ProviderRegistry>,
    memory: Arc<MemoryStore>,
    model: Arc<ResilientModelClient>,
    config: RoutingConfig,
}

impl Router {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        memory: Arc<MemoryStore>,
        model: Arc<ResilientModelClient>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            registry,
            memory,
            model,
            config,
        }
    }

    /// Route a query, selecting at most `max_selected` providers.
    pub async fn route(&self, query: &Query, max_selected: usize) -> Result<RoutingDecision, RoutingError> {
        let providers = self.registry.get_all();
        if providers.is_empty() {
            return Err(RoutingError::Exhausted);
        }

        let mut scores: BTreeMap<String, f32> = providers
            .iter()
            .map(|h| (h.id().to_string(), self.static_score(h, &query.text)))
            .collect();

        self.apply_memory_bonus(query, &mut scores).await;
        if self.config.model_rerank {
            self.apply_model_bonus(query, &providers, &mut scores).await;
        }

        let decision = self.decide(&providers, scores, max_selected.max(1))?;
        info!(
            user = %query.user_id,
            strategy = %decision.strategy,
            selected = ?decision.selected,
            "Query routed"
        );
        Ok(decision)
    }

    fn static_score(&self, handle: &ProviderHandle, text: &str) -> f32 {
        let keyword = keyword_hits(handle.keywords(), text) as f32 * self.config.keyword_weight;
        let capability = capability_overlap(handle, text) as f32 * self.config.capability_weight;
        keyword + capability
    }

    /// Recent interactions and similar past queries boost providers that
    /// already matched.
    async fn apply_memory_bonus(&self, query: &Query, scores: &mut BTreeMap<String, f32>) {
        if self.config.memory_weight <= 0.0 || !scores.values().any(|s| *s > 0.0) {
            return;
        }

        let since = Utc::now() - chrono::Duration::hours(self.config.recent_hours);
        let mut evidence: BTreeMap<String, f32> = BTreeMap::new();
        for record in self.memory.recent_ltm_since(&query.user_id, since).await {
            *evidence.entry(record.provider_id).or_default() += 1.0;
        }
        for m in self
            .memory
            .similarity_search(&query.user_id, &query.text, None, None)
            .await
        {
            *evidence.entry(m.provider_id).or_default() += (2.0 * m.similarity.max(0.0)).floor();
        }

        for (id, weight) in evidence {
            if let Some(score) = scores.get_mut(&id)
                && *score > 0.0
            {
                let bonus = self.config.memory_weight * weight;
                debug!(provider = %id, bonus, "Memory bonus");
                *score += bonus;
            }
        }
    }

    async fn apply_model_bonus(&self, query: &Query, providers: &[Arc<ProviderHandle>], scores: &mut BTreeMap<String, f32>) {
        let catalogue: String = providers
            .iter()
            .map(|h| format!("- {}: {} ({})", h.id(), h.description(), h.capabilities().join(", ")))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Pick the providers best suited to answer the query.\n\n\
             Providers:\n{catalogue}\n\n\
             Query: {}\n\n\
             Respond with JSON only: {{\"suggested_providers\": [\"ProviderId\", ...]}}",
            query.text
        );
        let request = self.model.request(prompt).with_temperature(0.0);

        let generation = match query.mode {
            QueryMode::Chat => {
                self.model
                    .generate_within(&request, Duration::from_millis(self.config.rerank_budget_ms))
                    .await
            }
            QueryMode::Batch => self.model.generate(&request).await,
        };
        if generation.degraded {
            debug!("Model unavailable, skipping re-ranking");
            return;
        }
        let Some(suggestion) = parse_suggestion(&generation.text) else {
            debug!("Unparsable model suggestion, skipping re-ranking");
            return;
        };

        for id in suggestion.suggested_providers {
            match scores.get_mut(&id) {
                Some(score) if *score > 0.0 || self.config.allow_model_new_candidates => {
                    debug!(provider = %id, "Model suggestion bonus");
                    *score += self.config.model_bonus;
                }
                Some(_) => debug!(provider = %id, "Ignoring model suggestion for unmatched provider"),
                None => debug!(provider = %id, "Ignoring model suggestion for unknown provider"),
            }
        }
    }

    fn decide(
        &self,
        providers: &[Arc<ProviderHandle>],
        scores: BTreeMap<String, f32>,
        max_selected: usize,
    ) -> Result<RoutingDecision, RoutingError> {
        let priority: BTreeMap<&str, u32> = providers
            .iter()
            .map(|h| (h.id(), h.descriptor.priority))
            .collect();

        // Score descending, then priority, then id.
        let mut ranked: Vec<(&str, f32)> = scores
            .iter()
            .filter(|(_, s)| **s > 0.0)
            .map(|(id, s)| (id.as_str(), *s))
            .collect();
        ranked.sort_by(|(ia, sa), (ib, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| priority.get(ia).cmp(&priority.get(ib)))
                .then_with(|| ia.cmp(ib))
        });

        let positive: BTreeMap<String, f32> = ranked.iter().map(|(id, s)| (id.to_string(), *s)).collect();

        let Some(&(top_id, top_score)) = ranked.first() else {
            let fallback = self.registry.fallback().ok_or(RoutingError::Exhausted)?;
            return Ok(RoutingDecision {
                strategy: Strategy::Fallback,
                selected: vec![fallback.id().to_string()],
                scores: positive,
                rationale: format!("No provider matched the query; using fallback {}", fallback.id()),
            });
        };

        let single = |rationale: String| RoutingDecision {
            strategy: Strategy::Single,
            selected: vec![top_id.to_string()],
            scores: positive.clone(),
            rationale,
        };

        if ranked.len() == 1 {
            return Ok(single(format!("Only {top_id} matched (score {top_score:.2})")));
        }
        if top_score >= self.config.high_confidence_threshold {
            return Ok(single(format!(
                "{top_id} matched with high confidence (score {top_score:.2})"
            )));
        }

        let selected: Vec<String> = ranked
            .iter()
            .filter(|(_, s)| *s >= MULTI_MIN_SCORE)
            .take(max_selected)
            .map(|(id, _)| id.to_string())
            .collect();

        match selected.len() {
            0 => Ok(single(format!(
                "Weak matches only; using best match {top_id} (score {top_score:.2})"
            ))),
            1 => Ok(single(format!("{top_id} was the only strong match (score {top_score:.2})"))),
            n => Ok(RoutingDecision {
                strategy: Strategy::Multi,
                rationale: format!("{n} providers matched: {}", selected.join(", ")),
                selected,
                scores: positive,
            }),
        }
    }
}

/// The first JSON object in the text, parsed as a suggestion.
fn parse_suggestion(text: &str) -> Option<ModelSuggestion> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
