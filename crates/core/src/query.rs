//! Queries, routing decisions and execution results.
//!
//! These are the values that flow through one request: a [`Query`] enters
//! the router, leaves as a [`RoutingDecision`], and each selected provider
//! produces an [`ExecutionResult`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a request should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Interactive: soft deadline, partial results are fine.
    #[default]
    Chat,
    /// Offline planning: every selected provider runs to completion.
    Batch,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Batch => write!(f, "batch"),
        }
    }
}

/// A single turn of conversation history attached to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// `user`, `assistant`, or `agent:<provider id>`.
    pub role: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Turn {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// Context gathered from memory before routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryContext {
    /// Recent session turns, most recent first.
    #[serde(default)]
    pub turns: Vec<Turn>,

    /// Recent short-term values keyed by provider id, most recent first.
    #[serde(default)]
    pub recent: Vec<(String, serde_json::Value)>,

    /// Profile the user has saved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,

    /// Summary of the user's last week of interactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<serde_json::Value>,
}

impl QueryContext {
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.recent.is_empty() && self.profile.is_none() && self.digest.is_none()
    }
}

/// A natural-language request from one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<QueryContext>,

    /// When the executor stops waiting for this provider, on the async
    /// runtime's clock. Model calls made while answering should settle
    /// (or degrade) before it.
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl Query {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: user_id.into(),
            mode: QueryMode::Chat,
            context: None,
            deadline: None,
        }
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Which execution shape the router chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Single,
    Multi,
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// The router's output: an ordered provider selection plus the evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub strategy: Strategy,

    /// Provider ids in execution order.
    pub selected: Vec<String>,

    /// Final score per provider that scored above zero.
    #[serde(default)]
    pub scores: BTreeMap<String, f32>,

    pub rationale: String,
}

/// Outcome of running one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub provider_id: String,
    pub response: String,
    pub success: bool,
    #[serde(with = "duration_ms")]
    pub latency: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(provider_id: impl Into<String>, response: String, latency: Duration) -> Self {
        Self {
            provider_id: provider_id.into(),
            response,
            success: true,
            latency,
            error: None,
        }
    }

    pub fn failed(provider_id: impl Into<String>, error: String, latency: Duration) -> Self {
        Self {
            provider_id: provider_id.into(),
            response: String::new(),
            success: false,
            latency,
            error: Some(error),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
