//! Implementation resolution.
//!
//! A descriptor names its implementation with a locator (`builtin::prompt`)
//! and an optional symbol (`PromptProvider`). The [`FactoryTable`] maps those
//! pairs to constructor functions registered at start-up. Registrations can
//! be replaced at runtime; the next `reload` picks the new factory up.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use switchyard_core::{CapabilityProvider, ImplementationError, ProviderDescriptor};
use switchyard_llm::ResilientModelClient;
use switchyard_memory::MemoryStore;
use tracing::{debug, warn};

/// Everything a factory receives to build one provider instance.
#[derive(Clone)]
pub struct ProviderInit {
    pub descriptor: ProviderDescriptor,
    pub memory: Arc<MemoryStore>,
    pub model: Arc<ResilientModelClient>,
}

/// Builds a provider, or explains why it could not.
pub type ProviderFactory =
    Arc<dyn Fn(ProviderInit) -> Result<Arc<dyn CapabilityProvider>, String> + Send + Sync>;

/// Outcome of resolving a `(locator, symbol)` pair.
#[derive(Clone)]
pub struct Resolved {
    /// The symbol actually chosen.
    pub symbol: String,
    pub entry_points: Vec<String>,
    pub factory: ProviderFactory,
    /// Set when the symbol had to be guessed among several exports.
    pub ambiguity: Option<ImplementationError>,
}

pub trait ImplementationResolver: Send + Sync {
    fn resolve(&self, locator: &str, symbol: &str) -> Result<Resolved, ImplementationError>;

    /// Every registered `(locator, symbol)` pair, sorted.
    fn registered(&self) -> Vec<(String, String)>;
}

#[derive(Clone)]
struct Registration {
    entry_points: Vec<String>,
    factory: ProviderFactory,
}

/// Explicit `(locator, symbol) → factory` table.
#[derive(Default)]
pub struct FactoryTable {
    locators: RwLock<BTreeMap<String, BTreeMap<String, Registration>>>,
}

impl FactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the built-in providers already registered.
    pub fn with_builtins() -> Self {
        let table = Self::new();
        crate::builtin::register_builtins(&table);
        table
    }

    /// Register (or replace) a factory.
    pub fn register<F>(&self, locator: &str, symbol: &str, entry_points: &[&str], factory: F)
    where
        F: Fn(ProviderInit) -> Result<Arc<dyn CapabilityProvider>, String> + Send + Sync + 'static,
    {
        let registration = Registration {
            entry_points: entry_points.iter().map(|e| e.to_string()).collect(),
            factory: Arc::new(factory),
        };
        let mut locators = self.locators.write().unwrap_or_else(|e| e.into_inner());
        let replaced = locators
            .entry(locator.to_string())
            .or_default()
            .insert(symbol.to_string(), registration)
            .is_some();
        debug!(locator, symbol, replaced, "Registered provider factory");
    }

    /// Drop a registration. Returns whether it existed.
    pub fn unregister(&self, locator: &str, symbol: &str) -> bool {
        let mut locators = self.locators.write().unwrap_or_else(|e| e.into_inner());
        let Some(symbols) = locators.get_mut(locator) else {
            return false;
        };
        let removed = symbols.remove(symbol).is_some();
        if symbols.is_empty() {
            locators.remove(locator);
        }
        removed
    }
}

impl ImplementationResolver for FactoryTable {
    fn resolve(&self, locator: &str, symbol: &str) -> Result<Resolved, ImplementationError> {
        let locators = self.locators.read().unwrap_or_else(|e| e.into_inner());
        let symbols = locators
            .get(locator)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ImplementationError::Missing {
                locator: locator.to_string(),
            })?;

        if let Some(reg) = symbols.get(symbol) {
            return Ok(Resolved {
                symbol: symbol.to_string(),
                entry_points: reg.entry_points.clone(),
                factory: reg.factory.clone(),
                ambiguity: None,
            });
        }

        // Unknown or empty symbol: take the locator's export, or the first
        // one in sorted order when there are several.
        let (chosen, reg) = symbols
            .iter()
            .next()
            .ok_or_else(|| ImplementationError::Missing {
                locator: locator.to_string(),
            })?;

        let ambiguity = (symbols.len() > 1).then(|| ImplementationError::Ambiguous {
            locator: locator.to_string(),
            symbol: symbol.to_string(),
            candidates: symbols.keys().cloned().collect::<Vec<_>>().join(", "),
        });
        if let Some(err) = &ambiguity {
            warn!(locator, chosen = %chosen, "{err}");
        }

        Ok(Resolved {
            symbol: chosen.clone(),
            entry_points: reg.entry_points.clone(),
            factory: reg.factory.clone(),
            ambiguity,
        })
    }

    fn registered(&self) -> Vec<(String, String)> {
        let locators = self.locators.read().unwrap_or_else(|e| e.into_inner());
        locators
            .iter()
            .flat_map(|(locator, symbols)| symbols.keys().map(move |s| (locator.clone(), s.clone())))
            .collect()
    }
}
