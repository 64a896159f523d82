//! Provider contract: the abstraction over capability providers.
//!
//! A capability provider (an "agent") answers queries in one domain. It
//! declares what it can do through capabilities and keywords, and the router
//! uses those declarations to decide which providers see a query.
//!
//! Implementations: the built-in prompt and history providers in
//! `switchyard-registry`, plus anything registered with its factory table.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::query::Query;

/// Per-provider execution knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Declarative description of one provider, as found in the registry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique id within a registry (e.g. "WeatherAgent").
    pub id: String,

    /// Implementation locator, resolved through the factory table
    /// (e.g. "builtin::prompt").
    pub implementation: String,

    /// Symbol within the locator. Empty means "whatever the locator exports".
    #[serde(default)]
    pub symbol: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower is preferred.
    #[serde(default = "default_priority")]
    pub priority: u32,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub execution: ExecutionSettings,
}

fn default_true() -> bool {
    true
}
fn default_priority() -> u32 {
    10
}
fn default_entry_point() -> String {
    "main".into()
}

impl ProviderDescriptor {
    /// Minimal descriptor; everything else takes its default.
    pub fn new(id: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            implementation: implementation.into(),
            symbol: String::new(),
            enabled: true,
            priority: default_priority(),
            entry_point: default_entry_point(),
            description: String::new(),
            capabilities: Vec::new(),
            keywords: Vec::new(),
            execution: ExecutionSettings::default(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// The core provider contract.
///
/// The executor only ever calls [`CapabilityProvider::process`]; the
/// declarations are read by the registry and the router.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// The provider id this instance was built for.
    fn id(&self) -> &str;

    /// Declared capabilities, e.g. `weather_forecast`.
    fn capabilities(&self) -> &[String];

    /// Declared routing keywords.
    fn keywords(&self) -> &[String];

    fn description(&self) -> &str {
        ""
    }

    /// Named entry points this implementation exposes.
    fn entry_points(&self) -> Vec<String> {
        vec!["main".into()]
    }

    /// Answer a query.
    async fn process(&self, query: &Query) -> std::result::Result<String, ProviderError>;

    /// Answer through a named entry point. `main` is [`process`](Self::process);
    /// implementations exporting more names override this.
    async fn invoke(&self, entry_point: &str, query: &Query) -> std::result::Result<String, ProviderError> {
        match entry_point {
            "main" => self.process(query).await,
            other => Err(ProviderError::failed(
                self.id(),
                format!("entry point '{other}' is not exported"),
            )),
        }
    }

    /// Self-assessed fit for a query, in `[0, 1]`.
    ///
    /// Default: fraction of declared keywords found in the text.
    fn confidence(&self, text: &str) -> f32 {
        let keywords = self.keywords();
        if keywords.is_empty() {
            return 0.0;
        }
        let lowered = text.to_lowercase();
        let hits = keywords
            .iter()
            .filter(|k| lowered.contains(&k.to_lowercase()))
            .count();
        (hits as f32 / keywords.len() as f32).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        keywords: Vec<String>,
    }

    #[async_trait]
    impl CapabilityProvider for Fixed {
        fn id(&self) -> &str {
            "fixed"
        }
        fn capabilities(&self) -> &[String] {
            &[]
        }
        fn keywords(&self) -> &[String] {
            &self.keywords
        }
        async fn process(&self, _query: &Query) -> std::result::Result<String, ProviderError> {
            Ok("ok".into())
        }
    }

    #[test]
    fn descriptor_defaults_from_toml() {
        let d: ProviderDescriptor = serde_json::from_value(serde_json::json!({
            "id": "WeatherAgent",
            "implementation": "builtin::prompt"
        }))
        .unwrap();
        assert!(d.enabled);
        assert_eq!(d.entry_point, "main");
        assert_eq!(d.execution.timeout_secs, 30);
        assert!(d.symbol.is_empty());
    }

    #[test]
    fn default_confidence_is_keyword_ratio() {
        let p = Fixed {
            keywords: vec!["weather".into(), "rain".into()],
        };
        assert!((p.confidence("Will it RAIN tomorrow?") - 0.5).abs() < f32::EPSILON);
        assert_eq!(p.confidence("museums"), 0.0);
    }

    #[tokio::test]
    async fn default_entry_point_is_main() {
        let p = Fixed { keywords: vec![] };
        assert_eq!(p.entry_points(), vec!["main".to_string()]);
        assert_eq!(p.process(&Query::new("x", "u")).await.unwrap(), "ok");
        assert_eq!(p.invoke("main", &Query::new("x", "u")).await.unwrap(), "ok");

        let err = p.invoke("search", &Query::new("x", "u")).await.unwrap_err();
        assert!(err.to_string().contains("entry point 'search' is not exported"));
    }
}
