//! The provider registry file (`providers.toml`).
//!
//! Holds the provider descriptors and the registry-level settings. The
//! registry rewrites this file on `add`/`remove`, so saving goes through a
//! temporary file and a rename.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use switchyard_core::ProviderDescriptor;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Provider cap for multi-provider routing in chat mode.
    #[serde(default = "default_max_selected")]
    pub max_selected: usize,

    /// Timeout applied to descriptors that do not set their own.
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,

    /// Extra attempts for a failed provider in batch mode.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Provider used when nothing matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,
}

fn default_max_selected() -> usize {
    3
}
fn default_timeout() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    2
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_selected: default_max_selected(),
            default_timeout_secs: default_timeout(),
            retry_attempts: default_retry_attempts(),
            fallback_provider: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub settings: RegistrySettings,

    #[serde(default)]
    pub providers: Vec<ProviderDescriptor>,
}

fn default_version() -> String {
    "1.0.0".into()
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            settings: RegistrySettings::default(),
            providers: Vec::new(),
        }
    }
}

impl RegistryFile {
    /// Load from a path. A missing file is an empty registry.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No registry file at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse TOML text and validate it.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: Default::default(),
            reason: e.to_string(),
        })?;
        file.validate()?;
        Ok(file)
    }

    /// Write to `path` atomically (temp file + rename).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |e: String| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e,
        };

        let content = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content).map_err(|e| write_err(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| write_err(e.to_string()))?;
        Ok(())
    }

    /// Structural checks: unique non-empty ids and sane settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for p in &self.providers {
            if p.id.trim().is_empty() {
                return Err(ConfigError::ValidationError("provider id must not be empty".into()));
            }
            if p.implementation.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}' has no implementation locator",
                    p.id
                )));
            }
            if !seen.insert(p.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider id '{}'",
                    p.id
                )));
            }
        }

        if self.settings.max_selected == 0 {
            return Err(ConfigError::ValidationError(
                "settings.max_selected must be > 0".into(),
            ));
        }

        Ok(())
    }

    pub fn find(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// A travel-planning starter registry, written by `config init`.
    pub fn example() -> Self {
        let prompt = |id: &str, priority: u32, description: &str, caps: &[&str], kws: &[&str]| {
            let mut d = ProviderDescriptor::new(id, "builtin::prompt")
                .with_priority(priority)
                .with_description(description)
                .with_capabilities(caps.iter().copied())
                .with_keywords(kws.iter().copied());
            d.symbol = "PromptProvider".into();
            d
        };

        let mut history = ProviderDescriptor::new("HistoryAgent", "builtin::history")
            .with_priority(5)
            .with_description("Recalls what the user asked and was told before")
            .with_capabilities(["history_search", "recall"])
            .with_keywords(["remember", "earlier", "previous", "history", "last time"]);
        history.symbol = "HistorySearchProvider".into();

        Self {
            version: default_version(),
            settings: RegistrySettings {
                fallback_provider: Some("LocationAgent".into()),
                ..RegistrySettings::default()
            },
            providers: vec![
                prompt(
                    "WeatherAgent",
                    1,
                    "Weather specialist for travel planning",
                    &["weather_forecast", "climate_info"],
                    &["weather", "rain", "forecast", "temperature", "sunny"],
                ),
                prompt(
                    "DiningAgent",
                    2,
                    "Restaurant and food recommendations",
                    &["restaurant_search", "cuisine_info"],
                    &["restaurant", "food", "eat", "dinner", "lunch", "cuisine"],
                ),
                prompt(
                    "LocationAgent",
                    3,
                    "General destinations and points of interest",
                    &["location_info", "attraction_search"],
                    &["visit", "attraction", "museum", "place", "city", "see"],
                ),
                history,
            ],
        }
    }
}
