//! Sequential provider execution.
//!
//! Chat queries run under a soft deadline: nothing new starts once it has
//! passed, and the provider in flight is cut off when it expires. Batch
//! queries run every selected provider to completion, retrying failures,
//! and only log when they overrun their budget.
//!
//! Every finished execution, successful or not, is written to memory and
//! to the registry's execution log.

use std::sync::Arc;
use std::time::Duration;

use switchyard_config::ExecutionConfig;
use switchyard_core::{ExecutionResult, ProviderError, Query, QueryMode, RoutingDecision};
use switchyard_memory::MemoryStore;
use switchyard_registry::{ProviderHandle, ProviderRegistry};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Share of a provider's budget held back so a model call that misses its
/// deadline can still degrade offline before the provider is abandoned.
const DEGRADE_RESERVE_DIVISOR: u32 = 10;
const MAX_DEGRADE_RESERVE: Duration = Duration::from_millis(250);

pub struct Executor {
    registry: Arc<ProviderRegistry>,
    memory: Arc<MemoryStore>,
    config: ExecutionConfig,
}

impl Executor {
    pub fn new(registry: Arc<ProviderRegistry>, memory: Arc<MemoryStore>, config: ExecutionConfig) -> Self {
        Self {
            registry,
            memory,
            config,
        }
    }

    /// Run the decision's providers in order.
    pub async fn execute(&self, query: &Query, decision: &RoutingDecision) -> Vec<ExecutionResult> {
        let results = match query.mode {
            QueryMode::Chat => self.execute_chat(query, &decision.selected).await,
            QueryMode::Batch => self.execute_batch(query, &decision.selected).await,
        };

        for result in &results {
            self.registry
                .record_execution(&result.provider_id, result.success, result.latency);
            self.memory
                .record_interaction(&query.user_id, &query.text, result, query.mode)
                .await;
        }
        results
    }

    async fn execute_chat(&self, query: &Query, selected: &[String]) -> Vec<ExecutionResult> {
        let deadline = Instant::now() + Duration::from_millis(self.config.chat_deadline_ms);
        let mut results = Vec::with_capacity(selected.len());

        for id in selected {
            let now = Instant::now();
            if now >= deadline {
                info!(
                    skipped = selected.len() - results.len(),
                    "Response deadline passed, returning partial results"
                );
                break;
            }
            let Some(handle) = self.registry.get(id) else {
                results.push(not_loaded(id));
                continue;
            };

            let remaining = deadline - now;
            let budget = handle.timeout().min(remaining);
            let cut_by_deadline = remaining < handle.timeout();
            results.push(run_once(&handle, query, budget, cut_by_deadline).await);
        }
        results
    }

    async fn execute_batch(&self, query: &Query, selected: &[String]) -> Vec<ExecutionResult> {
        let started = Instant::now();
        let budget = Duration::from_secs(self.config.batch_budget_secs);
        let retries = self.registry.settings().retry_attempts;
        let mut results = Vec::with_capacity(selected.len());
        let mut overrun_logged = false;

        for id in selected {
            let Some(handle) = self.registry.get(id) else {
                results.push(not_loaded(id));
                continue;
            };

            let mut attempt = 0;
            let result = loop {
                let result = run_once(&handle, query, handle.timeout(), false).await;
                if result.success || attempt >= retries {
                    break result;
                }
                attempt += 1;
                debug!(provider = %id, attempt, "Retrying failed provider");
            };
            results.push(result);

            if !overrun_logged && started.elapsed() > budget {
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    budget_secs = self.config.batch_budget_secs,
                    "Batch query over budget"
                );
                overrun_logged = true;
            }
        }
        results
    }
}

fn not_loaded(id: &str) -> ExecutionResult {
    warn!(provider = %id, "Selected provider is not loaded");
    ExecutionResult::failed(id, ProviderError::NotFound(id.to_string()).to_string(), Duration::ZERO)
}

/// Deadline handed to the provider: the end of its budget minus the
/// degrade reserve.
fn provider_deadline(started: Instant, budget: Duration) -> Instant {
    let reserve = (budget / DEGRADE_RESERVE_DIVISOR).min(MAX_DEGRADE_RESERVE);
    started + budget.saturating_sub(reserve)
}

/// One bounded call. Errors and timeouts become failed results.
async fn run_once(handle: &ProviderHandle, query: &Query, budget: Duration, cut_by_deadline: bool) -> ExecutionResult {
    let id = handle.id();
    let started = Instant::now();
    let query = query
        .clone()
        .with_deadline(provider_deadline(started, budget).into_std());
    let outcome = tokio::time::timeout(budget, handle.invoke(&query)).await;
    let latency = started.elapsed();

    match outcome {
        Ok(Ok(response)) => {
            debug!(provider = %id, latency_ms = latency.as_millis() as u64, "Provider succeeded");
            ExecutionResult::succeeded(id, response, latency)
        }
        Ok(Err(e)) => {
            warn!(provider = %id, error = %e, "Provider failed");
            ExecutionResult::failed(id, e.to_string(), latency)
        }
        Err(_) => {
            let error = if cut_by_deadline {
                ProviderError::DeadlineExceeded {
                    provider: id.to_string(),
                }
            } else {
                ProviderError::Timeout {
                    provider: id.to_string(),
                    timeout_ms: budget.as_millis() as u64,
                }
            };
            warn!(provider = %id, error = %error, "Provider abandoned");
            ExecutionResult::failed(id, error.to_string(), latency)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Fixture, Script};
    use switchyard_core::{ProviderDescriptor, Strategy};

    fn descriptor(id: &str, timeout_secs: u64) -> ProviderDescriptor {
        let mut d = ProviderDescriptor::new(id, "test::scripted").with_capabilities(["misc"]);
        d.execution.timeout_secs = timeout_secs;
        d
    }

    fn decision(ids: &[&str]) -> RoutingDecision {
        RoutingDecision {
            strategy: Strategy::Multi,
            selected: ids.iter().map(|s| s.to_string()).collect(),
            scores: Default::default(),
            rationale: String::new(),
        }
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let fx = Fixture::new()
            .provider(descriptor("A", 30), Script::Reply("alpha"))
            .provider(descriptor("B", 30), Script::Fail("boom"))
            .provider(descriptor("C", 30), Script::Reply("gamma"))
            .build();

        let results = fx
            .executor()
            .execute(&Query::new("q", "u1"), &decision(&["A", "B", "C"]))
            .await;
        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("boom"));
        assert!(results[2].success);
        assert_eq!(results[2].response, "gamma");
    }

    #[tokio::test]
    async fn every_result_is_recorded() {
        let fx = Fixture::new()
            .provider(descriptor("A", 30), Script::Reply("alpha"))
            .provider(descriptor("B", 30), Script::Fail("boom"))
            .build();

        fx.executor()
            .execute(&Query::new("q", "u1"), &decision(&["A", "B", "Ghost"]))
            .await;

        let ltm = fx.memory.ltm_by_user("u1").await;
        assert_eq!(ltm.len(), 3);
        assert!(fx.memory.get_stm("u1", "B").await.is_some());
        let stats = fx.registry.statistics();
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_timeout_bounds_a_hanging_provider() {
        let fx = Fixture::new()
            .provider(descriptor("Slow", 1), Script::Hang)
            .provider(descriptor("Fast", 30), Script::Reply("ok"))
            .execution(|e| e.chat_deadline_ms = 10_000)
            .build();

        let results = fx
            .executor()
            .execute(&Query::new("q", "u1"), &decision(&["Slow", "Fast"]))
            .await;
        assert!(results[0].error.as_deref().unwrap().contains("timed out after 1000ms"));
        assert!(results[1].success);
    }

    #[tokio::test(start_paused = true)]
    async fn chat_deadline_cuts_in_flight_and_skips_the_rest() {
        let fx = Fixture::new()
            .provider(descriptor("First", 30), Script::Delay(2_000, "first"))
            .provider(descriptor("Second", 30), Script::Hang)
            .provider(descriptor("Third", 30), Script::Reply("third"))
            .execution(|e| e.chat_deadline_ms = 3_000)
            .build();

        let results = fx
            .executor()
            .execute(&Query::new("q", "u1"), &decision(&["First", "Second", "Third"]))
            .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(results[1].error.as_deref().unwrap().contains("deadline exceeded"));
        assert_eq!(fx.calls("Third"), 0);
    }

    #[test]
    fn provider_deadline_keeps_a_bounded_reserve() {
        let start = Instant::now();
        assert_eq!(
            provider_deadline(start, Duration::from_millis(3_000)),
            start + Duration::from_millis(2_750)
        );
        assert_eq!(
            provider_deadline(start, Duration::from_millis(1_000)),
            start + Duration::from_millis(900)
        );
        assert_eq!(provider_deadline(start, Duration::ZERO), start);
    }

    #[tokio::test(start_paused = true)]
    async fn providers_see_a_deadline_inside_their_budget() {
        let fx = Fixture::new()
            .provider(descriptor("A", 30), Script::Reply("alpha"))
            .execution(|e| e.chat_deadline_ms = 2_000)
            .build();

        let before = Instant::now();
        fx.executor()
            .execute(&Query::new("q", "u1"), &decision(&["A"]))
            .await;
        let seen = fx.last_query("A").and_then(|q| q.deadline).unwrap();
        assert_eq!(seen, (before + Duration::from_millis(1_800)).into_std());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_runs_everything_and_retries() {
        let fx = Fixture::new()
            .provider(descriptor("Flaky", 30), Script::FailOnce("recovered"))
            .provider(descriptor("Slow", 30), Script::Delay(5_000, "slow"))
            .provider(descriptor("Broken", 30), Script::Fail("always"))
            .retry_attempts(2)
            .execution(|e| e.batch_budget_secs = 1)
            .build();

        let query = Query::new("q", "u1").with_mode(QueryMode::Batch);
        let results = fx
            .executor()
            .execute(&query, &decision(&["Flaky", "Slow", "Broken"]))
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].response, "recovered");
        assert!(results[1].success);
        assert!(!results[2].success);
        assert_eq!(fx.calls("Flaky"), 2);
        assert_eq!(fx.calls("Broken"), 3);
    }
}
