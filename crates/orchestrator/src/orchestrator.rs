//! The query pipeline: route, execute, synthesize, remember.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_config::{AppConfig, ExecutionConfig};
use switchyard_core::{Embedder, ExecutionResult, Query, QueryMode, RoutingDecision, Strategy};
use switchyard_llm::{ModelEmbedder, ResilientModelClient, client_from_config};
use switchyard_memory::MemoryStore;
use switchyard_registry::{FactoryTable, ImplementationResolver, ProviderRegistry};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::executor::Executor;
use crate::router::Router;
use crate::synthesizer::Synthesizer;

const NO_PROVIDERS_MESSAGE: &str = "No assistants are available to answer right now. Please try again later.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub mode: QueryMode,
}

impl QueryRequest {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: None,
            user_id: user_id.into(),
            text: text.into(),
            mode: QueryMode::Chat,
        }
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseError {
    /// Nothing could be routed to.
    NoProviders,
    /// Every selected provider failed.
    AllProvidersFailed,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProviders => f.write_str("no providers available"),
            Self::AllProvidersFailed => f.write_str("all providers failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Providers whose answers made it into the response, in order.
    pub providers_used: Vec<String>,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(with = "latency_ms")]
    pub latency: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<RoutingDecision>,
    #[serde(default)]
    pub results: Vec<ExecutionResult>,
}

impl QueryResponse {
    fn no_providers(latency: Duration) -> Self {
        Self {
            providers_used: Vec::new(),
            response: NO_PROVIDERS_MESSAGE.into(),
            strategy: None,
            latency,
            error: Some(ResponseError::NoProviders),
            decision: None,
            results: Vec::new(),
        }
    }
}

mod latency_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// One explicit application context; cheap to share behind an `Arc`.
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    memory: Arc<MemoryStore>,
    model: Arc<ResilientModelClient>,
    router: Router,
    executor: Executor,
    synthesizer: Synthesizer,
    execution: ExecutionConfig,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        memory: Arc<MemoryStore>,
        model: Arc<ResilientModelClient>,
        config: &AppConfig,
    ) -> Self {
        Self {
            router: Router::new(registry.clone(), memory.clone(), model.clone(), config.routing.clone()),
            executor: Executor::new(registry.clone(), memory.clone(), config.execution.clone()),
            synthesizer: Synthesizer::new(model.clone()),
            execution: config.execution.clone(),
            registry,
            memory,
            model,
        }
    }

    /// Build everything from configuration with the built-in providers.
    pub async fn from_config(config: &AppConfig) -> switchyard_core::Result<Self> {
        Self::from_config_with(config, Arc::new(FactoryTable::with_builtins())).await
    }

    /// Like [`Orchestrator::from_config`], with a caller-supplied resolver.
    pub async fn from_config_with(
        config: &AppConfig,
        resolver: Arc<dyn ImplementationResolver>,
    ) -> switchyard_core::Result<Self> {
        let model = Arc::new(client_from_config(&config.model));
        let model_embedder = (config.memory.embedder == "model")
            .then(|| Arc::new(ModelEmbedder::new(model.clone())) as Arc<dyn Embedder>);
        let memory = Arc::new(MemoryStore::open(&config.memory, &config.memory_path(), model_embedder).await);

        let registry = Arc::new(
            ProviderRegistry::new(resolver, memory.clone(), model.clone()).with_path(config.registry_path()),
        );
        let report = registry.load_from_disk()?;
        if !report.failed.is_empty() {
            warn!(failed = ?report.failed.keys().collect::<Vec<_>>(), "Some providers failed to load");
        }

        Ok(Self::new(registry, memory, model, config))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn model(&self) -> &Arc<ResilientModelClient> {
        &self.model
    }

    /// Answer a query. Never fails; problems are reported in the response.
    pub async fn handle(&self, request: QueryRequest) -> QueryResponse {
        let started = Instant::now();
        let query = self.prepare(&request).await;

        let max_selected = match request.mode {
            QueryMode::Chat => self.registry.settings().max_selected,
            QueryMode::Batch => self.execution.batch_max_providers,
        };
        let decision = match self.router.route(&query, max_selected).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(user = %request.user_id, error = %e, "Routing failed");
                return QueryResponse::no_providers(started.elapsed());
            }
        };

        self.run(query, decision, started).await
    }

    /// Answer a query with every provider declaring `capability`, skipping
    /// the router's scoring.
    pub async fn handle_by_capability(&self, capability: &str, request: QueryRequest) -> QueryResponse {
        let started = Instant::now();
        let query = self.prepare(&request).await;

        let max_selected = match request.mode {
            QueryMode::Chat => self.registry.settings().max_selected,
            QueryMode::Batch => self.execution.batch_max_providers,
        };
        let mut selected = self.registry.ids_by_capability(capability);
        if selected.is_empty() {
            warn!(capability, "No provider declares this capability");
            return QueryResponse::no_providers(started.elapsed());
        }
        selected.truncate(max_selected.max(1));

        let decision = RoutingDecision {
            strategy: if selected.len() == 1 { Strategy::Single } else { Strategy::Multi },
            rationale: format!("Providers declaring capability '{capability}'"),
            selected,
            scores: Default::default(),
        };
        self.run(query, decision, started).await
    }

    /// Snapshot the user's context, then log the user turn.
    async fn prepare(&self, request: &QueryRequest) -> Query {
        let context = self.memory.query_context(&request.user_id).await;
        self.memory
            .add_turn(&request.user_id, "user", &request.text, request.mode)
            .await;

        let query = Query::new(request.text.clone(), request.user_id.clone()).with_mode(request.mode);
        if context.is_empty() {
            query
        } else {
            query.with_context(context)
        }
    }

    async fn run(&self, query: Query, decision: RoutingDecision, started: Instant) -> QueryResponse {
        let results = self.executor.execute(&query, &decision).await;

        let (section_chars, summary_budget) = match query.mode {
            QueryMode::Chat => (
                self.execution.chat_section_chars,
                Some(Duration::from_millis(self.execution.summary_budget_ms)),
            ),
            QueryMode::Batch => (self.execution.batch_section_chars, None),
        };
        let response = self
            .synthesizer
            .synthesize(&query.text, &results, section_chars, summary_budget)
            .await;

        let providers_used: Vec<String> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.provider_id.clone())
            .collect();
        let error = providers_used
            .is_empty()
            .then_some(ResponseError::AllProvidersFailed);
        let latency = started.elapsed();

        info!(
            user = %query.user_id,
            strategy = %decision.strategy,
            providers = ?providers_used,
            latency_ms = latency.as_millis() as u64,
            failed = error.is_some(),
            "Query handled"
        );

        QueryResponse {
            providers_used,
            response,
            strategy: Some(decision.strategy),
            latency,
            error,
            decision: Some(decision),
            results,
        }
    }
}
