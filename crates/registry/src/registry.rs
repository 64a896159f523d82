//! The provider registry.
//!
//! Holds one [`ProviderHandle`] per enabled, successfully built descriptor.
//! Lookups clone `Arc`s and release the lock before anything runs. Mutations
//! build the new instance first and swap it in with a single write, so
//! readers never observe a half-built provider.
//!
//! Mutations are serialized by a separate writer mutex. It covers the
//! registry file write and the swap, never a provider build, and lookups
//! never wait on it. A rebuild that finishes after its descriptor was
//! removed or replaced is discarded.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchyard_config::{RegistryFile, RegistrySettings};
use switchyard_core::{CapabilityProvider, ImplementationError, ProviderDescriptor, ProviderError, Query, RegistryError};
use switchyard_llm::ResilientModelClient;
use switchyard_memory::MemoryStore;
use tracing::{debug, info, warn};

use crate::resolver::{ImplementationResolver, ProviderInit};
use crate::stats::{ExecutionLog, ProviderInfo, RegistryStatistics};

/// A loaded provider instance and the descriptor it was built from.
pub struct ProviderHandle {
    pub descriptor: ProviderDescriptor,
    pub instance: Arc<dyn CapabilityProvider>,
    pub loaded_at: DateTime<Utc>,
}

impl ProviderHandle {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Descriptor capabilities when declared, otherwise the instance's.
    pub fn capabilities(&self) -> &[String] {
        if self.descriptor.capabilities.is_empty() {
            self.instance.capabilities()
        } else {
            &self.descriptor.capabilities
        }
    }

    pub fn keywords(&self) -> &[String] {
        if self.descriptor.keywords.is_empty() {
            self.instance.keywords()
        } else {
            &self.descriptor.keywords
        }
    }

    pub fn description(&self) -> &str {
        if self.descriptor.description.is_empty() {
            self.instance.description()
        } else {
            &self.descriptor.description
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.descriptor.execution.timeout_secs)
    }

    /// Answer through the entry point the descriptor names.
    pub async fn invoke(&self, query: &Query) -> Result<String, ProviderError> {
        self.instance.invoke(&self.descriptor.entry_point, query).await
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("id", &self.descriptor.id)
            .field("implementation", &self.descriptor.implementation)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Outcome of a bulk load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Disabled descriptors.
    pub skipped: Vec<String>,
    /// Failed ids with the reason.
    pub failed: BTreeMap<String, String>,
}

/// Per-descriptor validation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCheck {
    pub id: String,
    pub enabled: bool,
    pub resolves: bool,
    pub contract_ok: bool,
    pub entry_point_ok: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl ProviderCheck {
    pub fn passed(&self) -> bool {
        self.resolves && self.contract_ok && self.entry_point_ok
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub providers: Vec<ProviderCheck>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Default)]
struct RegistryState {
    settings: RegistrySettings,
    /// Descriptors in file order, including disabled and failed ones.
    descriptors: Vec<ProviderDescriptor>,
    handles: BTreeMap<String, Arc<ProviderHandle>>,
}

impl RegistryState {
    fn to_file(&self) -> RegistryFile {
        RegistryFile {
            settings: self.settings.clone(),
            providers: self.descriptors.clone(),
            ..RegistryFile::default()
        }
    }
}

pub struct ProviderRegistry {
    resolver: Arc<dyn ImplementationResolver>,
    memory: Arc<MemoryStore>,
    model: Arc<ResilientModelClient>,
    path: Option<PathBuf>,
    state: RwLock<RegistryState>,
    writer: Mutex<()>,
    log: ExecutionLog,
}

impl ProviderRegistry {
    pub fn new(
        resolver: Arc<dyn ImplementationResolver>,
        memory: Arc<MemoryStore>,
        model: Arc<ResilientModelClient>,
    ) -> Self {
        Self {
            resolver,
            memory,
            model,
            path: None,
            state: RwLock::new(RegistryState::default()),
            writer: Mutex::new(()),
            log: ExecutionLog::default(),
        }
    }

    /// Back the registry with a file; `add`, `remove` and `reload_all` use it.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Held from a mutation's final check through its swap.
    fn writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Loading ---

    /// Replace the registry contents with `file`.
    ///
    /// Each enabled descriptor is resolved and built independently; a
    /// failure is logged and reported, never fatal.
    pub fn load(&self, file: RegistryFile) -> LoadReport {
        if let Err(e) = file.validate() {
            warn!(error = %e, "Registry file has problems; loading what is usable");
        }

        let mut report = LoadReport::default();
        let mut handles = BTreeMap::new();
        for descriptor in &file.providers {
            if !descriptor.enabled {
                debug!(provider = %descriptor.id, "Provider disabled, skipping");
                report.skipped.push(descriptor.id.clone());
                continue;
            }
            if handles.contains_key(&descriptor.id) {
                warn!(provider = %descriptor.id, "Duplicate provider id, keeping the first");
                report
                    .failed
                    .insert(descriptor.id.clone(), RegistryError::DuplicateId(descriptor.id.clone()).to_string());
                continue;
            }
            match self.instantiate(descriptor) {
                Ok(handle) => {
                    report.loaded.push(descriptor.id.clone());
                    handles.insert(descriptor.id.clone(), handle);
                }
                Err(e) => {
                    warn!(provider = %descriptor.id, error = %e, "Failed to load provider");
                    report.failed.insert(descriptor.id.clone(), e.to_string());
                }
            }
        }

        let _writer = self.writer();
        let mut state = self.write();
        state.settings = file.settings;
        state.descriptors = file.providers;
        state.handles = handles;
        drop(state);

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Provider registry loaded"
        );
        report
    }

    /// Load from the backing file. A missing file loads an empty registry.
    pub fn load_from_disk(&self) -> Result<LoadReport, RegistryError> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| RegistryError::Read("registry has no backing file".into()))?;
        let file = RegistryFile::load_from(path).map_err(|e| RegistryError::Read(e.to_string()))?;
        Ok(self.load(file))
    }

    fn instantiate(&self, descriptor: &ProviderDescriptor) -> Result<Arc<ProviderHandle>, ImplementationError> {
        let resolved = self
            .resolver
            .resolve(&descriptor.implementation, &descriptor.symbol)?;

        let contract = |reason: String| ImplementationError::InvalidContract {
            id: descriptor.id.clone(),
            reason,
        };

        if !resolved.entry_points.contains(&descriptor.entry_point) {
            return Err(contract(format!(
                "entry point '{}' not exported by {} (has: {})",
                descriptor.entry_point,
                resolved.symbol,
                resolved.entry_points.join(", ")
            )));
        }

        let instance = (resolved.factory)(ProviderInit {
            descriptor: descriptor.clone(),
            memory: self.memory.clone(),
            model: self.model.clone(),
        })
        .map_err(contract)?;

        if instance.id() != descriptor.id {
            return Err(contract(format!("instance reports id '{}'", instance.id())));
        }
        if descriptor.capabilities.is_empty() && instance.capabilities().is_empty() {
            return Err(contract("declares no capabilities".into()));
        }

        debug!(provider = %descriptor.id, symbol = %resolved.symbol, "Provider instantiated");
        Ok(Arc::new(ProviderHandle {
            descriptor: descriptor.clone(),
            instance,
            loaded_at: Utc::now(),
        }))
    }

    // --- Lookups ---

    pub fn get(&self, id: &str) -> Option<Arc<ProviderHandle>> {
        self.read().handles.get(id).cloned()
    }

    /// Every loaded provider, by priority then id.
    pub fn get_all(&self) -> Vec<Arc<ProviderHandle>> {
        let mut all: Vec<_> = self.read().handles.values().cloned().collect();
        all.sort_by(|a, b| {
            a.descriptor
                .priority
                .cmp(&b.descriptor.priority)
                .then_with(|| a.id().cmp(b.id()))
        });
        all
    }

    pub fn get_by_capability(&self, capability: &str) -> Vec<Arc<ProviderHandle>> {
        self.get_all()
            .into_iter()
            .filter(|h| h.capabilities().iter().any(|c| c.eq_ignore_ascii_case(capability)))
            .collect()
    }

    pub fn get_by_keyword(&self, keyword: &str) -> Vec<Arc<ProviderHandle>> {
        self.get_all()
            .into_iter()
            .filter(|h| h.keywords().iter().any(|k| k.eq_ignore_ascii_case(keyword)))
            .collect()
    }

    pub fn ids_by_capability(&self, capability: &str) -> Vec<String> {
        self.get_by_capability(capability)
            .iter()
            .map(|h| h.id().to_string())
            .collect()
    }

    /// All descriptors, including disabled and failed ones.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.read().descriptors.clone()
    }

    pub fn settings(&self) -> RegistrySettings {
        self.read().settings.clone()
    }

    /// The configured fallback when loaded, else the highest-priority provider.
    pub fn fallback(&self) -> Option<Arc<ProviderHandle>> {
        let configured = self.read().settings.fallback_provider.clone();
        if let Some(id) = configured {
            if let Some(handle) = self.get(&id) {
                return Some(handle);
            }
            debug!(provider = %id, "Configured fallback not loaded");
        }
        self.get_all().into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.read().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().handles.is_empty()
    }

    // --- Mutations ---

    /// Add and load a provider, then persist the registry file.
    pub fn add(&self, descriptor: ProviderDescriptor) -> Result<(), RegistryError> {
        if self.has_descriptor(&descriptor.id) {
            return Err(RegistryError::DuplicateId(descriptor.id));
        }

        let handle = if descriptor.enabled {
            Some(self.instantiate(&descriptor).map_err(|source| RegistryError::Load {
                id: descriptor.id.clone(),
                source,
            })?)
        } else {
            None
        };

        let _writer = self.writer();
        // Another writer may have added the same id while we were building.
        if self.has_descriptor(&descriptor.id) {
            return Err(RegistryError::DuplicateId(descriptor.id));
        }
        let mut file = self.read().to_file();
        file.providers.push(descriptor.clone());
        self.persist(&file)?;

        let mut state = self.write();
        if let Some(handle) = handle {
            state.handles.insert(descriptor.id.clone(), handle);
        }
        info!(provider = %descriptor.id, "Provider added");
        state.descriptors.push(descriptor);
        Ok(())
    }

    /// Remove a provider and its descriptor, then persist.
    pub fn remove(&self, id: &str) -> Result<ProviderDescriptor, RegistryError> {
        let _writer = self.writer();
        let (index, file) = {
            let state = self.read();
            let index = state
                .descriptors
                .iter()
                .position(|d| d.id == id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            let mut file = state.to_file();
            file.providers.remove(index);
            (index, file)
        };
        self.persist(&file)?;

        let mut state = self.write();
        state.handles.remove(id);
        info!(provider = %id, "Provider removed");
        Ok(state.descriptors.remove(index))
    }

    /// Rebuild one provider from its descriptor and swap it in.
    ///
    /// Fails with [`RegistryError::NotFound`] if the provider was removed
    /// during the rebuild, and [`RegistryError::Superseded`] if its
    /// descriptor was replaced; the registry is left as the other writer
    /// made it.
    pub fn reload(&self, id: &str) -> Result<(), RegistryError> {
        let descriptor = self
            .read()
            .descriptors
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        let handle = if descriptor.enabled {
            Some(self.instantiate(&descriptor).map_err(|source| RegistryError::Load {
                id: id.to_string(),
                source,
            })?)
        } else {
            None
        };

        let _writer = self.writer();
        let mut state = self.write();
        match state.descriptors.iter().find(|d| d.id == id) {
            None => {
                debug!(provider = %id, "Provider removed during reload, discarding rebuild");
                return Err(RegistryError::NotFound(id.to_string()));
            }
            Some(current) if *current != descriptor => {
                debug!(provider = %id, "Provider replaced during reload, discarding rebuild");
                return Err(RegistryError::Superseded(id.to_string()));
            }
            Some(_) => {}
        }
        match handle {
            Some(handle) => {
                state.handles.insert(id.to_string(), handle);
                info!(provider = %id, "Provider reloaded");
            }
            None => {
                state.handles.remove(id);
                debug!(provider = %id, "Disabled provider unloaded");
            }
        }
        Ok(())
    }

    /// Rebuild every provider, re-reading the backing file first if any.
    ///
    /// A provider that fails to rebuild keeps its previous instance. Adds
    /// and removals that land while the rebuild runs are kept.
    pub fn reload_all(&self) -> BTreeMap<String, bool> {
        let before: BTreeSet<String> = self.read().descriptors.iter().map(|d| d.id.clone()).collect();
        let reread = self.path.as_deref().and_then(|path| match RegistryFile::load_from(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not re-read registry file, reusing loaded descriptors");
                None
            }
        });
        let (settings, descriptors) = match reread {
            Some(file) => (file.settings, file.providers),
            None => {
                let state = self.read();
                (state.settings.clone(), state.descriptors.clone())
            }
        };

        let mut results = BTreeMap::new();
        let mut rebuilt = BTreeMap::new();
        for descriptor in descriptors.iter().filter(|d| d.enabled) {
            match self.instantiate(descriptor) {
                Ok(handle) => {
                    rebuilt.insert(descriptor.id.clone(), handle);
                    results.insert(descriptor.id.clone(), true);
                }
                Err(e) => {
                    warn!(provider = %descriptor.id, error = %e, "Reload failed");
                    results.insert(descriptor.id.clone(), false);
                }
            }
        }

        let _writer = self.writer();
        let mut state = self.write();
        let merged = merge_concurrent(&before, &state.descriptors, descriptors);

        let mut handles = BTreeMap::new();
        for descriptor in merged.iter().filter(|d| d.enabled) {
            let fresh = rebuilt
                .remove(&descriptor.id)
                .filter(|h| h.descriptor == *descriptor);
            if let Some(handle) = fresh.or_else(|| state.handles.get(&descriptor.id).cloned()) {
                handles.insert(descriptor.id.clone(), handle);
            }
        }
        results.retain(|id, _| merged.iter().any(|d| &d.id == id));

        state.settings = settings;
        state.descriptors = merged;
        state.handles = handles;
        drop(state);

        info!(
            reloaded = results.values().filter(|ok| **ok).count(),
            failed = results.values().filter(|ok| !**ok).count(),
            "Provider registry reloaded"
        );
        results
    }

    fn has_descriptor(&self, id: &str) -> bool {
        self.read().descriptors.iter().any(|d| d.id == id)
    }

    fn persist(&self, file: &RegistryFile) -> Result<(), RegistryError> {
        match &self.path {
            Some(path) => file
                .save_to(path)
                .map_err(|e| RegistryError::Persist(e.to_string())),
            None => Ok(()),
        }
    }

    // --- Validation ---

    /// Check every descriptor without touching the loaded instances.
    pub fn validate(&self) -> ValidationReport {
        let file = self.read().to_file();
        let mut report = ValidationReport::default();

        if let Err(e) = file.validate() {
            report.errors.push(e.to_string());
        }

        for descriptor in &file.providers {
            let mut check = ProviderCheck {
                id: descriptor.id.clone(),
                enabled: descriptor.enabled,
                resolves: false,
                contract_ok: false,
                entry_point_ok: false,
                issues: Vec::new(),
            };

            match self
                .resolver
                .resolve(&descriptor.implementation, &descriptor.symbol)
            {
                Ok(resolved) => {
                    check.resolves = true;
                    if let Some(ambiguity) = resolved.ambiguity {
                        report.warnings.push(format!("{}: {ambiguity}", descriptor.id));
                    }
                    check.entry_point_ok = resolved.entry_points.contains(&descriptor.entry_point);
                    if !check.entry_point_ok {
                        check
                            .issues
                            .push(format!("entry point '{}' not exported", descriptor.entry_point));
                    }
                    match self.instantiate(descriptor) {
                        Ok(_) => check.contract_ok = true,
                        Err(e) if check.entry_point_ok => check.issues.push(e.to_string()),
                        // Entry point mismatch already reported; probe the factory alone.
                        Err(_) => {
                            check.contract_ok = self.probe_factory(descriptor, &resolved.factory);
                        }
                    }
                }
                Err(e) => check.issues.push(e.to_string()),
            }

            if !descriptor.enabled {
                report
                    .warnings
                    .push(format!("{} is disabled and will not be loaded", descriptor.id));
            } else if !check.passed() {
                report.errors.push(format!("{} failed validation", descriptor.id));
            }
            report.providers.push(check);
        }

        if let Some(fallback) = &file.settings.fallback_provider
            && !file.providers.iter().any(|d| &d.id == fallback && d.enabled)
        {
            report
                .warnings
                .push(format!("fallback provider '{fallback}' is not an enabled provider"));
        }
        if file.providers.is_empty() {
            report.warnings.push("registry has no providers".into());
        }

        report.valid = report.errors.is_empty();
        report
    }

    fn probe_factory(&self, descriptor: &ProviderDescriptor, factory: &crate::resolver::ProviderFactory) -> bool {
        factory(ProviderInit {
            descriptor: descriptor.clone(),
            memory: self.memory.clone(),
            model: self.model.clone(),
        })
        .is_ok_and(|instance| !(descriptor.capabilities.is_empty() && instance.capabilities().is_empty()))
    }

    // --- Execution log ---

    pub fn record_execution(&self, id: &str, success: bool, latency: Duration) {
        self.log.record(id, success, latency);
    }

    pub fn statistics(&self) -> RegistryStatistics {
        self.log.snapshot(self.len())
    }

    pub fn provider_info(&self, id: &str) -> Option<ProviderInfo> {
        let handle = self.get(id)?;
        let stats = self.log.get(id);
        Some(ProviderInfo {
            descriptor: handle.descriptor.clone(),
            loaded_at: handle.loaded_at,
            capabilities: handle.capabilities().to_vec(),
            keywords: handle.keywords().to_vec(),
            executions: stats.executions,
            success_rate: stats.success_rate(),
            average_latency_ms: stats.average_latency_ms(),
        })
    }
}

/// Apply the adds and removals made since `before` (the ids present when
/// the reload started) on top of the freshly read descriptors.
fn merge_concurrent(
    before: &BTreeSet<String>,
    current: &[ProviderDescriptor],
    fresh: Vec<ProviderDescriptor>,
) -> Vec<ProviderDescriptor> {
    let now: BTreeSet<&str> = current.iter().map(|d| d.id.as_str()).collect();
    let mut merged: Vec<ProviderDescriptor> = fresh
        .into_iter()
        .filter(|d| !before.contains(&d.id) || now.contains(d.id.as_str()))
        .collect();
    for added in current.iter().filter(|d| !before.contains(&d.id)) {
        if !merged.iter().any(|d| d.id == added.id) {
            merged.push(added.clone());
        }
    }
    merged
}
