//! Resilient model client: retry with backoff, then degrade offline.
//!
//! Wraps a single [`ModelBackend`] and never fails from the caller's point
//! of view: every [`ResilientModelClient::generate`] call yields text, either
//! from the model or from the [`OfflineResponder`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchyard_config::ModelConfig;
use switchyard_core::{GenerateRequest, Generation, ModelBackend, ModelError};
use tracing::{debug, info, warn};

use crate::offline::OfflineResponder;

/// Where the client is in its per-call state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting { attempt: u32 },
    Generating { attempt: u32 },
    Retrying { attempt: u32, delay_ms: u64 },
    Succeeded,
    Degraded,
}

/// Retry bounds for one call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

pub struct ResilientModelClient {
    backend: Option<Arc<dyn ModelBackend>>,
    policy: RetryPolicy,
    offline: OfflineResponder,
    availability_timeout: Duration,
    call_timeout: Duration,
    defaults: GenerationDefaults,
    connected: AtomicBool,
    state: Mutex<ClientState>,
}

#[derive(Debug, Clone, Copy)]
struct GenerationDefaults {
    temperature: f32,
    max_tokens: u32,
}

impl ResilientModelClient {
    pub fn new(backend: Arc<dyn ModelBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend: Some(backend),
            policy,
            offline: OfflineResponder::new(),
            availability_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(40),
            defaults: GenerationDefaults {
                temperature: 0.7,
                max_tokens: 2000,
            },
            connected: AtomicBool::new(false),
            state: Mutex::new(ClientState::Idle),
        }
    }

    /// A client with no backend: every call is answered offline.
    pub fn offline_only() -> Self {
        Self {
            backend: None,
            ..Self::new(Arc::new(NoBackend), RetryPolicy::default())
        }
    }

    /// Build from configuration around an already-constructed backend.
    pub fn from_config(backend: Arc<dyn ModelBackend>, config: &ModelConfig) -> Self {
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs_f64(config.retry_delay_secs.max(0.0)),
        };
        let mut client = Self::new(backend, policy);
        client.availability_timeout = Duration::from_secs(config.availability_timeout_secs);
        client.call_timeout = Duration::from_secs(config.connect_timeout_secs + config.read_timeout_secs);
        client.defaults = GenerationDefaults {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };
        client
    }

    pub fn with_availability_timeout(mut self, timeout: Duration) -> Self {
        self.availability_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.as_deref().map_or("offline", |b| b.name())
    }

    /// State reached by the most recent call.
    pub fn state(&self) -> ClientState {
        self.state.lock().map(|s| *s).unwrap_or(ClientState::Idle)
    }

    fn set_state(&self, next: ClientState) {
        debug!(state = ?next, "Model client state");
        if let Ok(mut s) = self.state.lock() {
            *s = next;
        }
    }

    /// A request pre-filled with the configured temperature and token cap.
    pub fn request(&self, prompt: impl Into<String>) -> GenerateRequest {
        GenerateRequest::new(prompt)
            .with_temperature(self.defaults.temperature)
            .with_max_tokens(self.defaults.max_tokens)
    }

    /// Cheap availability probe, bounded by the availability timeout.
    pub async fn is_available(&self) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        let ok = matches!(
            tokio::time::timeout(self.availability_timeout, backend.health_check()).await,
            Ok(Ok(true))
        );
        self.connected.store(ok, Ordering::Relaxed);
        ok
    }

    /// Model names known to the backend; empty on any failure.
    pub async fn list_models(&self) -> Vec<String> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        match tokio::time::timeout(self.availability_timeout, backend.list_models()).await {
            Ok(Ok(models)) => models,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to list models");
                Vec::new()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Embed through the backend. Single attempt, bounded by the call timeout.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| ModelError::NotConfigured("no model backend".into()))?;
        tokio::time::timeout(self.call_timeout, backend.embed(text))
            .await
            .map_err(|_| ModelError::Timeout(format!("embedding exceeded {:?}", self.call_timeout)))?
    }

    /// Generate with retries; errors once retries are exhausted or the
    /// failure is not retryable.
    pub async fn try_generate(&self, request: &GenerateRequest) -> Result<(String, u32), ModelError> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| ModelError::NotConfigured("no model backend".into()))?;

        let mut attempt = 0u32;
        loop {
            match self.attempt(backend.as_ref(), request, attempt).await {
                Ok(text) => {
                    self.set_state(ClientState::Succeeded);
                    return Ok((text, attempt + 1));
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        backend = backend.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    self.set_state(ClientState::Retrying {
                        attempt: attempt + 1,
                        delay_ms: delay.as_millis() as u64,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ModelError::Unavailable {
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Generate text. Never fails: degrades to the offline responder.
    pub async fn generate(&self, request: &GenerateRequest) -> Generation {
        let result = self.try_generate(request).await;
        self.settle(request, result)
    }

    /// Like [`generate`](Self::generate), but answers offline if the model
    /// has not produced text by `deadline`. `None` waits for the full retry
    /// schedule.
    ///
    /// The deadline is read on the tokio clock, so it may come from
    /// [`tokio::time::Instant::into_std`].
    pub async fn generate_before(&self, request: &GenerateRequest, deadline: Option<std::time::Instant>) -> Generation {
        let Some(deadline) = deadline else {
            return self.generate(request).await;
        };
        let deadline = tokio::time::Instant::from_std(deadline);
        let result = match tokio::time::timeout_at(deadline, self.try_generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout("caller deadline reached".into())),
        };
        self.settle(request, result)
    }

    /// [`generate_before`](Self::generate_before) with a deadline `budget` from now.
    pub async fn generate_within(&self, request: &GenerateRequest, budget: Duration) -> Generation {
        let deadline = tokio::time::Instant::now() + budget;
        self.generate_before(request, Some(deadline.into_std())).await
    }

    fn settle(&self, request: &GenerateRequest, result: Result<(String, u32), ModelError>) -> Generation {
        match result {
            Ok((text, attempts)) => Generation {
                text,
                degraded: false,
                attempts,
            },
            Err(e) => {
                let attempts = match &e {
                    ModelError::Unavailable { attempts, .. } => *attempts,
                    _ => 0,
                };
                info!(error = %e, "Model unavailable, answering offline");
                self.set_state(ClientState::Degraded);
                Generation {
                    text: self.offline.respond(request),
                    degraded: true,
                    attempts,
                }
            }
        }
    }

    async fn attempt(
        &self,
        backend: &dyn ModelBackend,
        request: &GenerateRequest,
        attempt: u32,
    ) -> Result<String, ModelError> {
        if !self.connected.load(Ordering::Relaxed) {
            self.set_state(ClientState::Connecting { attempt });
            let reachable = tokio::time::timeout(self.availability_timeout, backend.health_check())
                .await
                .map_err(|_| ModelError::Timeout("availability probe timed out".into()))??;
            if !reachable {
                return Err(ModelError::Network(format!("{} is not reachable", backend.name())));
            }
            self.connected.store(true, Ordering::Relaxed);
        }

        self.set_state(ClientState::Generating { attempt });
        let result = tokio::time::timeout(self.call_timeout, backend.generate(request))
            .await
            .map_err(|_| ModelError::Timeout(format!("generation exceeded {:?}", self.call_timeout)))
            .and_then(|r| r);

        if matches!(&result, Err(e) if e.is_retryable()) {
            self.connected.store(false, Ordering::Relaxed);
        }
        result
    }
}

/// Placeholder backend for [`ResilientModelClient::offline_only`]; never called.
struct NoBackend;

#[async_trait::async_trait]
impl ModelBackend for NoBackend {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<String, ModelError> {
        Err(ModelError::NotConfigured("no model backend".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Fails `failures` times with `error`, then answers "ok".
    struct FlakyBackend {
        failures: u32,
        error: ModelError,
        calls: AtomicU32,
    }

    impl FlakyBackend {
        fn new(failures: u32, error: ModelError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ModelBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<String, ModelError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok("ok".into())
            }
        }
    }

    /// Hangs forever (for timeout testing).
    struct HangingBackend;

    #[async_trait::async_trait]
    impl ModelBackend for HangingBackend {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn generate(&self, _request: &GenerateRequest) -> Result<String, ModelError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ModelError::Timeout("unreachable".into()))
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(p.delay_for(0), Duration::from_secs(2));
        assert_eq!(p.delay_for(1), Duration::from_secs(4));
        assert_eq!(p.delay_for(2), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let backend = Arc::new(FlakyBackend::new(2, ModelError::Network("refused".into())));
        let client = ResilientModelClient::new(backend.clone(), policy(3));
        let generation = client.generate(&GenerateRequest::new("hi")).await;
        assert!(!generation.degraded);
        assert_eq!(generation.text, "ok");
        assert_eq!(generation.attempts, 3);
        assert_eq!(backend.calls(), 3);
        assert_eq!(client.state(), ClientState::Succeeded);
    }

    #[tokio::test]
    async fn total_outage_degrades_after_bounded_retries() {
        let backend = Arc::new(FlakyBackend::new(u32::MAX, ModelError::Timeout("read".into())));
        let client = ResilientModelClient::new(backend.clone(), policy(3));
        let req = GenerateRequest::new("What's the weather in Lisbon?");

        let first = client.generate(&req).await;
        assert!(first.degraded);
        assert!(!first.text.is_empty());
        assert_eq!(backend.calls(), 4);
        assert_eq!(client.state(), ClientState::Degraded);

        let second = client.generate(&req).await;
        assert_eq!(first.text, second.text);
    }

    #[tokio::test]
    async fn non_retryable_error_degrades_immediately() {
        let backend = Arc::new(FlakyBackend::new(
            u32::MAX,
            ModelError::Status {
                status_code: 401,
                message: "bad key".into(),
            },
        ));
        let client = ResilientModelClient::new(backend.clone(), policy(3));
        let generation = client.generate(&GenerateRequest::new("hi")).await;
        assert!(generation.degraded);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn hanging_backend_times_out_then_degrades() {
        let client = ResilientModelClient::new(Arc::new(HangingBackend), policy(1))
            .with_call_timeout(Duration::from_millis(20));
        let generation = client.generate(&GenerateRequest::new("dinner ideas")).await;
        assert!(generation.degraded);
        assert_eq!(generation.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_cuts_the_retry_schedule_short() {
        let backend = Arc::new(FlakyBackend::new(u32::MAX, ModelError::Network("refused".into())));
        let client = ResilientModelClient::from_config(backend.clone(), &ModelConfig::default());
        let req = GenerateRequest::new("What's the weather in Lisbon?");

        let started = tokio::time::Instant::now();
        let generation = client.generate_within(&req, Duration::from_millis(2_750)).await;
        assert!(generation.degraded);
        assert!(generation.text.contains("Lisbon"));
        assert!(started.elapsed() >= Duration::from_millis(2_750));
        assert!(started.elapsed() < Duration::from_secs(3));
        // The first attempt and the retry after 2s; the 4s wait is cut short.
        assert_eq!(backend.calls(), 2);
        assert_eq!(client.state(), ClientState::Degraded);

        let offline = ResilientModelClient::offline_only().generate(&req).await;
        assert_eq!(generation.text, offline.text);
    }

    #[tokio::test]
    async fn no_deadline_behaves_like_generate() {
        let backend = Arc::new(FlakyBackend::new(1, ModelError::Network("refused".into())));
        let client = ResilientModelClient::new(backend, policy(2));
        let generation = client.generate_before(&GenerateRequest::new("hi"), None).await;
        assert!(!generation.degraded);
        assert_eq!(generation.attempts, 2);
    }

    #[tokio::test]
    async fn offline_only_client_never_calls_out() {
        let client = ResilientModelClient::offline_only();
        assert!(!client.is_available().await);
        assert!(client.list_models().await.is_empty());
        let generation = client.generate(&GenerateRequest::new("hello")).await;
        assert!(generation.degraded);
        assert_eq!(generation.attempts, 0);
        assert!(client.embed("x").await.is_err());
    }
}
