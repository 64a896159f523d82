//! Shared test helpers: scripted providers, a scripted model and a fixture
//! builder wiring them into a registry.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use switchyard_config::{AppConfig, ExecutionConfig, RegistryFile, RoutingConfig};
use switchyard_core::{
    CapabilityProvider, GenerateRequest, ModelBackend, ModelError, ProviderDescriptor, ProviderError, Query,
};
use switchyard_llm::{ResilientModelClient, RetryPolicy};
use switchyard_memory::MemoryStore;
use switchyard_registry::{FactoryTable, ProviderInit, ProviderRegistry};

use crate::executor::Executor;
use crate::orchestrator::Orchestrator;
use crate::router::Router;

/// How a scripted provider behaves on every call.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Reply(&'static str),
    Fail(&'static str),
    /// Never returns.
    Hang,
    /// Sleeps for the given milliseconds, then replies.
    Delay(u64, &'static str),
    /// Fails on the first call, replies afterwards.
    FailOnce(&'static str),
}

pub struct ScriptedProvider {
    id: String,
    script: Script,
    capabilities: Vec<String>,
    calls: AtomicUsize,
    last_query: Mutex<Option<Query>>,
}

impl ScriptedProvider {
    pub fn new(id: &str, script: Script) -> Self {
        Self {
            id: id.to_string(),
            script,
            capabilities: vec!["scripted".into()],
            calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<Query> {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
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
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());
        match self.script {
            Script::Reply(text) => Ok(text.to_string()),
            Script::Fail(message) => Err(ProviderError::failed(&self.id, message)),
            Script::Hang => std::future::pending().await,
            Script::Delay(ms, text) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(text.to_string())
            }
            Script::FailOnce(_) if call == 0 => Err(ProviderError::failed(&self.id, "first call fails")),
            Script::FailOnce(text) => Ok(text.to_string()),
        }
    }
}

/// A model backend that always answers with the same text, fails, or
/// never answers.
struct ScriptedBackend {
    reply: Option<String>,
    hang: bool,
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }
    async fn generate(&self, _request: &GenerateRequest) -> Result<String, ModelError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.reply
            .clone()
            .ok_or_else(|| ModelError::Status {
                status_code: 400,
                message: "scripted failure".into(),
            })
    }
}

pub struct ScriptedModel;

impl ScriptedModel {
    pub fn replying(text: &str) -> ResilientModelClient {
        Self::client(Some(text.to_string()))
    }

    /// Every generation fails without retries, so the client degrades.
    pub fn failing() -> ResilientModelClient {
        Self::client(None)
    }

    /// Every generation hangs until the caller gives up.
    pub fn hanging() -> ResilientModelClient {
        ResilientModelClient::new(
            Arc::new(ScriptedBackend {
                reply: None,
                hang: true,
            }),
            RetryPolicy::default(),
        )
    }

    fn client(reply: Option<String>) -> ResilientModelClient {
        ResilientModelClient::new(
            Arc::new(ScriptedBackend { reply, hang: false }),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::ZERO,
            },
        )
    }
}

pub struct Fixture {
    table: FactoryTable,
    file: RegistryFile,
    providers: BTreeMap<String, Arc<ScriptedProvider>>,
    model: ResilientModelClient,
    config: AppConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            table: FactoryTable::new(),
            file: RegistryFile::default(),
            providers: BTreeMap::new(),
            model: ResilientModelClient::offline_only(),
            config: AppConfig::default(),
        }
    }

    /// Add a provider; its symbol is its id so each gets its own script.
    pub fn provider(mut self, mut descriptor: ProviderDescriptor, script: Script) -> Self {
        let instance = Arc::new(ScriptedProvider::new(&descriptor.id, script));
        let shared = instance.clone();
        self.table
            .register("test::scripted", &descriptor.id, &["main"], move |_init: ProviderInit| {
                Ok(shared.clone() as Arc<dyn CapabilityProvider>)
            });
        self.providers.insert(descriptor.id.clone(), instance);
        descriptor.implementation = "test::scripted".into();
        descriptor.symbol = descriptor.id.clone();
        self.file.providers.push(descriptor);
        self
    }

    pub fn fallback(mut self, id: &str) -> Self {
        self.file.settings.fallback_provider = Some(id.to_string());
        self
    }

    pub fn max_selected(mut self, max: usize) -> Self {
        self.file.settings.max_selected = max;
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.file.settings.retry_attempts = attempts;
        self
    }

    pub fn model(mut self, model: ResilientModelClient) -> Self {
        self.model = model;
        self
    }

    pub fn routing(mut self, f: impl FnOnce(&mut RoutingConfig)) -> Self {
        f(&mut self.config.routing);
        self
    }

    pub fn execution(mut self, f: impl FnOnce(&mut ExecutionConfig)) -> Self {
        f(&mut self.config.execution);
        self
    }

    pub fn build(self) -> Built {
        let memory = Arc::new(MemoryStore::in_memory());
        let model = Arc::new(self.model);
        let registry = Arc::new(ProviderRegistry::new(Arc::new(self.table), memory.clone(), model.clone()));
        registry.load(self.file);
        Built {
            registry,
            memory,
            model,
            config: self.config,
            providers: self.providers,
        }
    }
}

pub struct Built {
    pub registry: Arc<ProviderRegistry>,
    pub memory: Arc<MemoryStore>,
    pub model: Arc<ResilientModelClient>,
    pub config: AppConfig,
    providers: BTreeMap<String, Arc<ScriptedProvider>>,
}

impl Built {
    pub fn router(&self) -> Router {
        Router::new(
            self.registry.clone(),
            self.memory.clone(),
            self.model.clone(),
            self.config.routing.clone(),
        )
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.registry.clone(), self.memory.clone(), self.config.execution.clone())
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.registry.clone(),
            self.memory.clone(),
            self.model.clone(),
            &self.config,
        )
    }

    pub fn calls(&self, id: &str) -> usize {
        self.providers.get(id).map_or(0, |p| p.calls())
    }

    pub fn last_query(&self, id: &str) -> Option<Query> {
        self.providers.get(id).and_then(|p| p.last_query())
    }
}
