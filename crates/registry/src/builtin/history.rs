//! Answers from the user's own history. Never calls the model.
//!
//! `main` reports similar questions and recent answers; `search` lists only
//! the matching past questions.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{CapabilityProvider, ProviderDescriptor, ProviderError, Query};
use switchyard_memory::MemoryStore;

use crate::resolver::ProviderInit;

const PREVIEW_CHARS: usize = 120;

pub struct HistorySearchProvider {
    descriptor: ProviderDescriptor,
    memory: Arc<MemoryStore>,
}

impl HistorySearchProvider {
    pub fn new(init: ProviderInit) -> Self {
        Self {
            descriptor: init.descriptor,
            memory: init.memory,
        }
    }
}

impl HistorySearchProvider {
    async fn search(&self, query: &Query) -> Result<String, ProviderError> {
        let similar = self
            .memory
            .similarity_search(&query.user_id, &query.text, None, None)
            .await;
        if similar.is_empty() {
            return Ok("No earlier questions match.".into());
        }
        let lines: Vec<String> = similar
            .iter()
            .map(|m| format!("{:.2} {} ({})", m.similarity, preview(&m.content), m.provider_id))
            .collect();
        Ok(lines.join("\n"))
    }
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

#[async_trait]
impl CapabilityProvider for HistorySearchProvider {
    fn id(&self) -> &str {
        &self.descriptor.id
    }

    fn capabilities(&self) -> &[String] {
        &self.descriptor.capabilities
    }

    fn keywords(&self) -> &[String] {
        &self.descriptor.keywords
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn entry_points(&self) -> Vec<String> {
        vec!["main".into(), "search".into()]
    }

    async fn invoke(&self, entry_point: &str, query: &Query) -> Result<String, ProviderError> {
        match entry_point {
            "main" => self.process(query).await,
            "search" => self.search(query).await,
            other => Err(ProviderError::failed(
                &self.descriptor.id,
                format!("entry point '{other}' is not exported"),
            )),
        }
    }

    async fn process(&self, query: &Query) -> Result<String, ProviderError> {
        let search = self.memory.search_history(&query.user_id, &query.text, None).await;
        if search.total_matches == 0 {
            return Ok("I don't have any earlier conversations with you yet.".into());
        }

        let mut out = String::from("Here is what I found in your history:");
        if !search.similar.is_empty() {
            out.push_str("\n\nSimilar questions:");
            for m in &search.similar {
                let _ = write!(
                    out,
                    "\n- \"{}\" ({}, {}, similarity {:.2})",
                    preview(&m.content),
                    m.provider_id,
                    m.timestamp.format("%Y-%m-%d"),
                    m.similarity
                );
            }
        }
        if !search.recent_interactions.is_empty() {
            out.push_str("\n\nRecent answers:");
            for r in &search.recent_interactions {
                let _ = write!(out, "\n- {} → {}: {}", preview(&r.input), r.provider_id, preview(&r.output));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchyard_core::{ExecutionResult, QueryMode};
    use switchyard_llm::ResilientModelClient;

    fn provider(memory: Arc<MemoryStore>) -> HistorySearchProvider {
        HistorySearchProvider::new(ProviderInit {
            descriptor: ProviderDescriptor::new("HistoryAgent", "builtin::history")
                .with_capabilities(["history_search"]),
            memory,
            model: Arc::new(ResilientModelClient::offline_only()),
        })
    }

    #[tokio::test]
    async fn empty_history_says_so() {
        let p = provider(Arc::new(MemoryStore::in_memory()));
        let reply = p.process(&Query::new("what did I ask before?", "u1")).await.unwrap();
        assert!(reply.contains("don't have any earlier conversations"));
    }

    #[tokio::test]
    async fn lists_similar_and_recent() {
        let memory = Arc::new(MemoryStore::in_memory());
        let result = ExecutionResult::succeeded("WeatherAgent", "Sunny in Lisbon".into(), Duration::from_millis(3));
        memory
            .record_interaction("u1", "weather in Lisbon", &result, QueryMode::Chat)
            .await;

        let p = provider(memory);
        let reply = p.process(&Query::new("remember the weather in Lisbon?", "u1")).await.unwrap();
        assert!(reply.contains("Similar questions:"));
        assert!(reply.contains("\"weather in Lisbon\" (WeatherAgent"));
        assert!(reply.contains("weather in Lisbon → WeatherAgent: Sunny in Lisbon"));
    }

    #[tokio::test]
    async fn search_entry_point_lists_matching_questions_only() {
        let memory = Arc::new(MemoryStore::in_memory());
        let result = ExecutionResult::succeeded("WeatherAgent", "Sunny in Lisbon".into(), Duration::from_millis(3));
        memory
            .record_interaction("u1", "weather in Lisbon", &result, QueryMode::Chat)
            .await;

        let p = provider(memory);
        let reply = p.invoke("search", &Query::new("weather in Lisbon", "u1")).await.unwrap();
        assert_eq!(reply, "1.00 weather in Lisbon (WeatherAgent)");
        assert!(p.invoke("export", &Query::new("x", "u1")).await.is_err());
    }

    #[test]
    fn preview_truncates_long_lines() {
        let long = "x".repeat(200);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 1);
        assert_eq!(preview("first\nsecond"), "first");
    }
}
