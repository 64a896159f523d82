//! End-to-end integration tests for the Switchyard runtime.
//!
//! These wire the real stack together from files on disk: a registry file,
//! a durable memory backend and the built-in providers, answering offline.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use switchyard_config::{AppConfig, MemoryConfig, RegistryFile};
use switchyard_core::{CapabilityProvider, ProviderDescriptor, ProviderError, Query, Strategy};
use switchyard_llm::ResilientModelClient;
use switchyard_memory::MemoryStore;
use switchyard_orchestrator::{Orchestrator, QueryRequest};
use switchyard_registry::{FactoryTable, ProviderInit, ProviderRegistry};

// ── Harness ──────────────────────────────────────────────────────────────

/// A provider that converts currency with a fixed rate.
struct CurrencyProvider {
    id: String,
    capabilities: Vec<String>,
}

#[async_trait]
impl CapabilityProvider for CurrencyProvider {
    fn id(&self) -> &str {
        &self.id
    }
    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }
    fn keywords(&self) -> &[String] {
        &[]
    }
    async fn process(&self, query: &Query) -> Result<String, ProviderError> {
        let amount: f64 = query
            .text
            .split_whitespace()
            .find_map(|w| w.parse().ok())
            .ok_or_else(|| ProviderError::failed(&self.id, "no amount in query"))?;
        Ok(format!("{amount} EUR is about {:.2} USD.", amount * 1.1))
    }
}

fn table_with_currency() -> FactoryTable {
    let table = FactoryTable::with_builtins();
    table.register("plugins::currency", "CurrencyProvider", &["main"], |init: ProviderInit| {
        Ok(Arc::new(CurrencyProvider {
            id: init.descriptor.id.clone(),
            capabilities: vec!["currency_conversion".into()],
        }) as Arc<dyn CapabilityProvider>)
    });
    table
}

/// Build the pipeline the way `Orchestrator::from_config` does, minus the
/// network-backed model.
async fn boot(dir: &Path, backend: &str, table: FactoryTable) -> Orchestrator {
    let mut config = AppConfig::default();
    config.registry_file = Some(dir.join("providers.toml"));
    config.memory = MemoryConfig {
        backend: backend.into(),
        path: Some(dir.join("memory")),
        ..MemoryConfig::default()
    };

    let model = Arc::new(ResilientModelClient::offline_only());
    let memory = Arc::new(MemoryStore::open(&config.memory, &config.memory_path(), None).await);
    let registry = Arc::new(
        ProviderRegistry::new(Arc::new(table), memory.clone(), model.clone()).with_path(config.registry_path()),
    );
    let report = registry.load_from_disk().unwrap();
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    Orchestrator::new(registry, memory, model, &config)
}

fn write_example(dir: &Path) {
    RegistryFile::example().save_to(&dir.join("providers.toml")).unwrap();
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_sqlite_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    write_example(dir.path());

    {
        let first = boot(dir.path(), "sqlite", FactoryTable::with_builtins()).await;
        assert_eq!(first.memory().backend_name(), "sqlite");
        let response = first
            .handle(QueryRequest::new("traveller", "What's the weather in Lisbon?"))
            .await;
        assert_eq!(response.providers_used, vec!["WeatherAgent"]);
    }

    let second = boot(dir.path(), "sqlite", FactoryTable::with_builtins()).await;
    let history = second.memory().ltm_by_user("traveller").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].provider_id, "WeatherAgent");

    let response = second
        .handle(QueryRequest::new("traveller", "Do you remember what I asked earlier?"))
        .await;
    assert_eq!(response.providers_used, vec!["HistoryAgent"]);
    assert!(response.response.contains("What's the weather in Lisbon?"));
}

#[tokio::test]
async fn e2e_file_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    write_example(dir.path());

    {
        let first = boot(dir.path(), "file", FactoryTable::with_builtins()).await;
        first
            .handle(QueryRequest::new("traveller", "Any good restaurant for dinner in Porto?"))
            .await;
    }

    let second = boot(dir.path(), "file", FactoryTable::with_builtins()).await;
    let history = second.memory().ltm_by_provider("traveller", "DiningAgent").await;
    assert_eq!(history.len(), 1);
    assert!(history[0].output.contains("Porto"));

    let search = second
        .memory()
        .search_history("traveller", "Any good restaurant for dinner in Porto?", None)
        .await;
    assert!(!search.similar.is_empty());
    assert!(search.similar[0].similarity > 0.9);
}

#[tokio::test]
async fn e2e_added_provider_is_routed_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    write_example(dir.path());
    let orchestrator = boot(dir.path(), "memory", table_with_currency()).await;

    let mut currency = ProviderDescriptor::new("CurrencyAgent", "plugins::currency")
        .with_priority(4)
        .with_description("Converts prices between currencies")
        .with_keywords(["convert", "currency", "euros", "dollars"]);
    currency.symbol = "CurrencyProvider".into();
    orchestrator.registry().add(currency).unwrap();

    let response = orchestrator
        .handle(QueryRequest::new("traveller", "Convert 20 euros to dollars"))
        .await;
    assert_eq!(response.strategy, Some(Strategy::Single));
    assert_eq!(response.response, "20 EUR is about 22.00 USD.");

    let on_disk = RegistryFile::load_from(&dir.path().join("providers.toml")).unwrap();
    assert!(on_disk.find("CurrencyAgent").is_some());

    orchestrator.registry().remove("CurrencyAgent").unwrap();
    let on_disk = RegistryFile::load_from(&dir.path().join("providers.toml")).unwrap();
    assert!(on_disk.find("CurrencyAgent").is_none());
    assert!(orchestrator.registry().get("CurrencyAgent").is_none());
}

#[tokio::test]
async fn e2e_reload_picks_up_file_edits() {
    let dir = tempfile::tempdir().unwrap();
    write_example(dir.path());
    let orchestrator = boot(dir.path(), "memory", FactoryTable::with_builtins()).await;

    let path = dir.path().join("providers.toml");
    let mut file = RegistryFile::load_from(&path).unwrap();
    for p in &mut file.providers {
        if p.id == "WeatherAgent" {
            p.enabled = false;
        }
    }
    file.save_to(&path).unwrap();

    let outcome = orchestrator.registry().reload_all();
    assert!(!outcome.contains_key("WeatherAgent"));
    assert!(outcome.values().all(|ok| *ok));
    assert!(orchestrator.registry().get("WeatherAgent").is_none());

    let response = orchestrator
        .handle(QueryRequest::new("traveller", "What's the weather in Lisbon?"))
        .await;
    assert_eq!(response.strategy, Some(Strategy::Fallback));
    assert_eq!(response.providers_used, vec!["LocationAgent"]);

    // Reloading twice changes nothing.
    let again = orchestrator.registry().reload_all();
    assert_eq!(again, outcome);
}

#[tokio::test]
async fn e2e_missing_registry_file_means_no_providers() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = boot(dir.path(), "memory", FactoryTable::with_builtins()).await;
    assert!(orchestrator.registry().is_empty());

    let response = orchestrator.handle(QueryRequest::new("u1", "hello")).await;
    assert!(response.error.is_some());
    assert!(response.providers_used.is_empty());
    assert!(!response.response.is_empty());
}

#[tokio::test]
async fn e2e_validation_flags_unknown_implementations() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = RegistryFile::example();
    let mut ghost = ProviderDescriptor::new("GhostAgent", "plugins::ghost").with_capabilities(["haunting"]);
    ghost.symbol = "Ghost".into();
    file.providers.push(ghost);
    file.save_to(&dir.path().join("providers.toml")).unwrap();

    let memory = Arc::new(MemoryStore::in_memory());
    let model = Arc::new(ResilientModelClient::offline_only());
    let registry = ProviderRegistry::new(Arc::new(FactoryTable::with_builtins()), memory, model)
        .with_path(dir.path().join("providers.toml"));
    let report = registry.load_from_disk().unwrap();
    assert!(report.failed.contains_key("GhostAgent"));
    assert_eq!(report.loaded.len(), 4);

    let validation = registry.validate();
    assert!(!validation.valid);
    let ghost = validation.providers.iter().find(|c| c.id == "GhostAgent").unwrap();
    assert!(!ghost.resolves);
    assert!(!ghost.passed());
}

#[test]
fn e2e_config_defaults_and_validation() {
    let text = AppConfig::default_toml();
    let parsed: AppConfig = toml::from_str(&text).unwrap();
    parsed.validate().unwrap();
    assert_eq!(parsed.memory.backend, "sqlite");

    let broken: AppConfig = toml::from_str("[execution]\nchat_deadline_ms = 0\n").unwrap();
    assert!(broken.validate().is_err());
}
