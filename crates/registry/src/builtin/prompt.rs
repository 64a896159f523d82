//! Model-backed provider driven entirely by its descriptor.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{CapabilityProvider, GenerateRequest, ProviderDescriptor, ProviderError, Query, Turn};
use switchyard_llm::ResilientModelClient;
use switchyard_memory::MemoryStore;
use tracing::debug;

use crate::resolver::ProviderInit;

/// Context turns included in the system prompt.
const CONTEXT_TURNS: usize = 5;
/// Similar past queries included in the system prompt.
const SIMILAR_LIMIT: usize = 3;
const SIMILARITY_FLOOR: f32 = 0.5;
/// Notes this provider kept about the user, included in the system prompt.
const NOTES_LIMIT: usize = 10;

pub struct PromptProvider {
    descriptor: ProviderDescriptor,
    memory: Arc<MemoryStore>,
    model: Arc<ResilientModelClient>,
}

impl PromptProvider {
    pub fn new(init: ProviderInit) -> Self {
        Self {
            descriptor: init.descriptor,
            memory: init.memory,
            model: init.model,
        }
    }

    fn persona(&self) -> String {
        let d = &self.descriptor;
        let mut system = format!("You are {}", d.id);
        if !d.description.is_empty() {
            let _ = write!(system, ", {}", d.description.trim_end_matches('.'));
        }
        system.push('.');
        if !d.capabilities.is_empty() {
            let _ = write!(system, " You handle: {}.", d.capabilities.join(", ").replace('_', " "));
        }
        system.push_str(" Answer the user's question directly and concisely.");
        system
    }

    /// Persona plus what is known about the user, recent conversation and
    /// related past questions.
    async fn system_prompt(&self, query: &Query) -> String {
        let mut system = self.persona();

        let profile = match query.context.as_ref().and_then(|ctx| ctx.profile.clone()) {
            Some(profile) => Some(profile),
            None => self.memory.profile(&query.user_id).await,
        };
        if let Some(profile) = profile {
            let _ = write!(system, "\n\nUser profile: {profile}");
        }

        let notes = self
            .memory
            .provider_notes(&self.descriptor.id, Some(&query.user_id), Some(NOTES_LIMIT))
            .await;
        if !notes.is_empty() {
            system.push_str("\n\nYour notes about this user:");
            for note in &notes {
                let _ = write!(system, "\n- {}: {}", note.key, note.value);
            }
        }

        let turns: Vec<Turn> = match &query.context {
            Some(ctx) => ctx.turns.iter().take(CONTEXT_TURNS).cloned().collect(),
            None => {
                self.memory
                    .session_context(&query.user_id, Some(CONTEXT_TURNS))
                    .await
            }
        };
        if !turns.is_empty() {
            system.push_str("\n\nRecent conversation (oldest first):");
            for turn in turns.iter().rev() {
                let _ = write!(system, "\n- {}: {}", turn.role, turn.text);
            }
        }

        let similar: Vec<_> = self
            .memory
            .similarity_search(&query.user_id, &query.text, Some(&self.descriptor.id), Some(SIMILAR_LIMIT))
            .await
            .into_iter()
            .filter(|m| m.similarity >= SIMILARITY_FLOOR)
            .collect();
        if !similar.is_empty() {
            system.push_str("\n\nThe user asked you similar things before:");
            for m in &similar {
                let _ = write!(system, "\n- {}", m.content);
            }
        }

        system
    }
}

#[async_trait]
impl CapabilityProvider for PromptProvider {
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

    async fn process(&self, query: &Query) -> Result<String, ProviderError> {
        let settings = &self.descriptor.execution;
        let request = GenerateRequest::new(query.text.clone())
            .with_system(self.system_prompt(query).await)
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens);

        let generation = self.model.generate_before(&request, query.deadline).await;
        debug!(
            provider = %self.descriptor.id,
            degraded = generation.degraded,
            attempts = generation.attempts,
            "Prompt provider generated"
        );

        let text = generation.text.trim();
        if text.is_empty() {
            return Err(ProviderError::failed(&self.descriptor.id, "model returned an empty response"));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{QueryContext, QueryMode};

    fn provider(memory: Arc<MemoryStore>) -> PromptProvider {
        PromptProvider::new(ProviderInit {
            descriptor: ProviderDescriptor::new("WeatherAgent", "builtin::prompt")
                .with_description("Weather specialist for travel planning")
                .with_capabilities(["weather_forecast", "climate_info"])
                .with_keywords(["weather", "rain"]),
            memory,
            model: Arc::new(ResilientModelClient::offline_only()),
        })
    }

    #[test]
    fn persona_mentions_identity_and_capabilities() {
        let p = provider(Arc::new(MemoryStore::in_memory()));
        let persona = p.persona();
        assert!(persona.starts_with("You are WeatherAgent, Weather specialist for travel planning."));
        assert!(persona.contains("weather forecast, climate info"));
    }

    #[tokio::test]
    async fn offline_answer_is_deterministic_and_topical() {
        let p = provider(Arc::new(MemoryStore::in_memory()));
        let query = Query::new("What's the weather in Lisbon?", "u1");

        let first = p.process(&query).await.unwrap();
        let second = p.process(&query).await.unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Weather outlook for Lisbon"));
        assert!(first.contains("Generated offline"));
    }

    #[tokio::test]
    async fn system_prompt_includes_context_and_history() {
        let memory = Arc::new(MemoryStore::in_memory());
        memory
            .store_embedding("u1", "WeatherAgent", "weather in Lisbon tomorrow", serde_json::Value::Null)
            .await;
        let p = provider(memory.clone());

        let query = Query::new("weather in Lisbon tomorrow", "u1").with_context(QueryContext {
            turns: vec![Turn::new("agent:WeatherAgent", "Sunny"), Turn::new("user", "hello")],
            ..QueryContext::default()
        });
        let system = p.system_prompt(&query).await;
        assert!(system.contains("- user: hello\n- agent:WeatherAgent: Sunny"));
        assert!(system.contains("similar things before:\n- weather in Lisbon tomorrow"));
    }

    #[tokio::test]
    async fn system_prompt_includes_profile_and_own_notes() {
        let memory = Arc::new(MemoryStore::in_memory());
        memory.cache_profile("u1", serde_json::json!({"home": "Porto"})).await;
        memory
            .store_provider_note("WeatherAgent", "u1", "units", "celsius", serde_json::Value::Null)
            .await;
        memory
            .store_provider_note("DiningAgent", "u1", "diet", "vegan", serde_json::Value::Null)
            .await;
        let p = provider(memory);

        let system = p.system_prompt(&Query::new("rain?", "u1")).await;
        assert!(system.contains("User profile: {\"home\":\"Porto\"}"));
        assert!(system.contains("Your notes about this user:\n- units: celsius"));
        assert!(!system.contains("vegan"));

        let with_context = Query::new("rain?", "u1").with_context(QueryContext {
            profile: Some(serde_json::json!({"home": "Faro"})),
            ..QueryContext::default()
        });
        assert!(p.system_prompt(&with_context).await.contains("Faro"));
    }

    #[tokio::test]
    async fn falls_back_to_session_context_from_memory() {
        let memory = Arc::new(MemoryStore::in_memory());
        memory.add_turn("u1", "user", "planning a trip", QueryMode::Chat).await;
        let p = provider(memory);

        let system = p.system_prompt(&Query::new("rain?", "u1")).await;
        assert!(system.contains("- user: planning a trip"));
    }
}
