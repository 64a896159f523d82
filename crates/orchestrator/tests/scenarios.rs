//! End-to-end routing scenarios over the public API.
//!
//! The travel registry from `RegistryFile::example()` runs on the built-in
//! providers; the model is either offline or a backend that always fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use switchyard_config::{AppConfig, ModelConfig, RegistryFile};
use switchyard_core::{
    CapabilityProvider, GenerateRequest, ModelBackend, ModelError, ProviderDescriptor, ProviderError, Query,
    Strategy,
};
use switchyard_llm::{ResilientModelClient, RetryPolicy};
use switchyard_memory::MemoryStore;
use switchyard_orchestrator::{NO_ANSWER, Orchestrator, QueryRequest, ResponseError};
use switchyard_registry::{FactoryTable, ProviderInit, ProviderRegistry};

// ── Helpers ───────────────────────────────────────────────────────────────

/// A backend that is reachable but fails every generation.
struct OutageBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl ModelBackend for OutageBackend {
    fn name(&self) -> &str {
        "outage"
    }
    async fn generate(&self, _request: &GenerateRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ModelError::Network("connection refused".into()))
    }
}

fn travel_orchestrator(model: ResilientModelClient) -> Orchestrator {
    let memory = Arc::new(MemoryStore::in_memory());
    let model = Arc::new(model);
    let registry = Arc::new(ProviderRegistry::new(
        Arc::new(FactoryTable::with_builtins()),
        memory.clone(),
        model.clone(),
    ));
    let report = registry.load(RegistryFile::example());
    assert!(report.failed.is_empty(), "example registry must load: {:?}", report.failed);
    Orchestrator::new(registry, memory, model, &AppConfig::default())
}

/// A provider answering with a fixed reply, or failing.
struct Canned {
    id: String,
    reply: Result<&'static str, &'static str>,
    capabilities: Vec<String>,
}

#[async_trait]
impl CapabilityProvider for Canned {
    fn id(&self) -> &str {
        &self.id
    }
    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }
    fn keywords(&self) -> &[String] {
        &[]
    }
    async fn process(&self, _query: &Query) -> Result<String, ProviderError> {
        self.reply
            .map(str::to_string)
            .map_err(|e| ProviderError::failed(&self.id, e))
    }
}

fn canned_table(replies: &[(&'static str, Result<&'static str, &'static str>)]) -> FactoryTable {
    let table = FactoryTable::new();
    for (symbol, reply) in replies {
        let reply = *reply;
        table.register("test::canned", symbol, &["main"], move |init: ProviderInit| {
            Ok(Arc::new(Canned {
                id: init.descriptor.id.clone(),
                reply,
                capabilities: vec!["canned".into()],
            }) as Arc<dyn CapabilityProvider>)
        });
    }
    table
}

fn canned(id: &str, priority: u32, keywords: &[&str]) -> ProviderDescriptor {
    let mut d = ProviderDescriptor::new(id, "test::canned")
        .with_priority(priority)
        .with_capabilities(["canned"])
        .with_keywords(keywords.iter().copied());
    d.symbol = id.to_string();
    d
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn weather_in_lisbon_goes_to_weather_agent() {
    let orchestrator = travel_orchestrator(ResilientModelClient::offline_only());
    let response = orchestrator
        .handle(QueryRequest::new("traveller", "What's the weather in Lisbon?"))
        .await;

    assert_eq!(response.strategy, Some(Strategy::Single));
    assert_eq!(response.providers_used, vec!["WeatherAgent"]);
    assert!(response.response.contains("Weather outlook for Lisbon"));
    assert!(response.error.is_none());

    let history = orchestrator.memory().ltm_by_provider("traveller", "WeatherAgent").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].input, "What's the weather in Lisbon?");
}

#[tokio::test]
async fn unmatched_query_falls_back_to_location_agent() {
    let orchestrator = travel_orchestrator(ResilientModelClient::offline_only());
    let response = orchestrator
        .handle(QueryRequest::new("traveller", "Tell me something interesting"))
        .await;

    assert_eq!(response.strategy, Some(Strategy::Fallback));
    assert_eq!(response.providers_used, vec!["LocationAgent"]);
    assert!(!response.response.is_empty());
}

#[tokio::test]
async fn one_failing_provider_does_not_sink_the_others() {
    let table = canned_table(&[
        ("Weather", Ok("Sunny and 24C.")),
        ("Dining", Err("kitchen on fire")),
        ("Places", Ok("Visit Belem Tower.")),
    ]);
    let memory = Arc::new(MemoryStore::in_memory());
    let model = Arc::new(ResilientModelClient::offline_only());
    let registry = Arc::new(ProviderRegistry::new(Arc::new(table), memory.clone(), model.clone()));
    registry.load(RegistryFile {
        providers: vec![
            canned("Weather", 1, &["weather"]),
            canned("Dining", 2, &["dinner"]),
            canned("Places", 3, &["visit"]),
        ],
        ..RegistryFile::default()
    });
    let orchestrator = Orchestrator::new(registry.clone(), memory, model, &AppConfig::default());

    let response = orchestrator
        .handle(QueryRequest::new("u1", "weather, dinner and what to visit"))
        .await;

    assert_eq!(response.strategy, Some(Strategy::Multi));
    assert_eq!(response.results.len(), 3);
    assert_eq!(response.providers_used, vec!["Weather", "Places"]);
    assert!(response.response.contains("**Weather**\nSunny and 24C."));
    assert!(response.response.contains("**Places**\nVisit Belem Tower."));
    assert!(!response.response.contains("kitchen on fire"));
    assert!(response.error.is_none());

    let stats = registry.statistics();
    assert_eq!(stats.total_executions, 3);
    assert_eq!(stats.successful_executions, 2);
}

#[tokio::test]
async fn every_provider_failing_yields_a_polite_message() {
    let table = canned_table(&[("Weather", Err("down"))]);
    let memory = Arc::new(MemoryStore::in_memory());
    let model = Arc::new(ResilientModelClient::offline_only());
    let registry = Arc::new(ProviderRegistry::new(Arc::new(table), memory.clone(), model.clone()));
    registry.load(RegistryFile {
        providers: vec![canned("Weather", 1, &["weather"])],
        ..RegistryFile::default()
    });
    let orchestrator = Orchestrator::new(registry, memory, model, &AppConfig::default());

    let response = orchestrator.handle(QueryRequest::new("u1", "weather?")).await;
    assert_eq!(response.error, Some(ResponseError::AllProvidersFailed));
    assert_eq!(response.response, NO_ANSWER);
}

#[tokio::test(start_paused = true)]
async fn total_model_outage_degrades_deterministically() {
    let backend = Arc::new(OutageBackend {
        calls: AtomicUsize::new(0),
    });
    let client = ResilientModelClient::new(
        backend.clone(),
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
        },
    );
    let orchestrator = travel_orchestrator(client);

    let first = orchestrator
        .handle(QueryRequest::new("u1", "Will it rain in Porto tomorrow?"))
        .await;
    let second = orchestrator
        .handle(QueryRequest::new("u2", "Will it rain in Porto tomorrow?"))
        .await;

    assert!(first.error.is_none());
    assert!(!first.response.is_empty());
    assert!(first.response.contains("Generated offline"));
    assert!(first.response.contains("Porto"));
    assert_eq!(first.response, second.response);
    // Three attempts per query: the first plus two retries.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn default_retry_schedule_still_answers_inside_the_chat_deadline() {
    let backend = Arc::new(OutageBackend {
        calls: AtomicUsize::new(0),
    });
    let client = ResilientModelClient::from_config(backend.clone(), &ModelConfig::default());
    let orchestrator = travel_orchestrator(client);
    let deadline = Duration::from_millis(AppConfig::default().execution.chat_deadline_ms);

    let response = orchestrator
        .handle(QueryRequest::new("traveller", "What's the weather in Lisbon?"))
        .await;

    assert!(response.error.is_none(), "{:?}", response.results);
    assert_eq!(response.providers_used, vec!["WeatherAgent"]);
    assert!(response.response.contains("Weather outlook for Lisbon"));
    assert!(response.response.contains("Generated offline"));
    assert!(response.latency < deadline);
    assert!(backend.calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn multi_provider_outage_answer_is_bounded() {
    let backend = Arc::new(OutageBackend {
        calls: AtomicUsize::new(0),
    });
    let client = ResilientModelClient::from_config(backend, &ModelConfig::default());
    let orchestrator = travel_orchestrator(client);
    let config = AppConfig::default();
    let ceiling =
        Duration::from_millis(config.execution.chat_deadline_ms + config.execution.summary_budget_ms);

    let response = orchestrator
        .handle(QueryRequest::new("traveller", "Sunny lunch in Porto"))
        .await;

    assert_eq!(response.strategy, Some(Strategy::Multi));
    assert_eq!(response.providers_used, vec!["WeatherAgent", "DiningAgent"]);
    assert!(response.latency <= ceiling);
}

#[tokio::test]
async fn history_agent_recalls_earlier_questions() {
    let orchestrator = travel_orchestrator(ResilientModelClient::offline_only());
    orchestrator
        .handle(QueryRequest::new("traveller", "What's the weather in Lisbon?"))
        .await;

    let response = orchestrator
        .handle(QueryRequest::new("traveller", "Do you remember what I asked earlier?"))
        .await;
    assert_eq!(response.providers_used, vec!["HistoryAgent"]);
    assert!(response.response.contains("What's the weather in Lisbon?"));
}

#[tokio::test]
async fn users_do_not_see_each_others_history() {
    let orchestrator = travel_orchestrator(ResilientModelClient::offline_only());
    orchestrator
        .handle(QueryRequest::new("alice", "What's the weather in Lisbon?"))
        .await;

    let response = orchestrator
        .handle(QueryRequest::new("bob", "Do you remember what I asked earlier?"))
        .await;
    assert!(!response.response.contains("Lisbon"));
    assert_eq!(orchestrator.memory().ltm_by_user("bob").await.len(), 1);
}
