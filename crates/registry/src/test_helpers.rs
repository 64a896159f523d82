//! Shared test helpers for registry tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use switchyard_core::{CapabilityProvider, ProviderError, Query};

use crate::resolver::{FactoryTable, ProviderInit};

/// A provider that always answers with the same text.
pub struct StaticProvider {
    id: String,
    reply: String,
    capabilities: Vec<String>,
    keywords: Vec<String>,
    pub calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(id: &str, reply: &str) -> Self {
        Self {
            id: id.to_string(),
            reply: reply.to_string(),
            capabilities: vec!["static_reply".into()],
            keywords: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn without_capabilities(mut self) -> Self {
        self.capabilities.clear();
        self
    }
}

#[async_trait]
impl CapabilityProvider for StaticProvider {
    fn id(&self) -> &str {
        &self.id
    }
    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }
    fn keywords(&self) -> &[String] {
        &self.keywords
    }
    async fn process(&self, _query: &Query) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.reply.clone())
    }
}

/// A table with `test::static` registered, replying with `reply`.
pub fn static_table(reply: &'static str) -> FactoryTable {
    let table = FactoryTable::new();
    register_static(&table, reply);
    table
}

pub fn register_static(table: &FactoryTable, reply: &'static str) {
    table.register("test::static", "StaticProvider", &["main"], move |init: ProviderInit| {
        Ok(Arc::new(StaticProvider::new(&init.descriptor.id, reply)) as Arc<dyn CapabilityProvider>)
    });
}
