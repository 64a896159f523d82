//! Execution log and statistics.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchyard_core::ProviderDescriptor;

/// Running counters for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub executions: u64,
    pub successes: u64,
    pub total_latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<DateTime<Utc>>,
}

impl ProviderStats {
    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.successes as f64 / self.executions as f64
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.executions as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_loaded: usize,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub success_rate: f64,
    pub per_provider: BTreeMap<String, ProviderStats>,
}

/// Descriptor plus runtime facts for one loaded provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub descriptor: ProviderDescriptor,
    pub loaded_at: DateTime<Utc>,
    pub capabilities: Vec<String>,
    pub keywords: Vec<String>,
    pub executions: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
}

#[derive(Default)]
pub(crate) struct ExecutionLog {
    per_provider: Mutex<BTreeMap<String, ProviderStats>>,
}

impl ExecutionLog {
    pub fn record(&self, provider_id: &str, success: bool, latency: Duration) {
        let mut map = self.per_provider.lock().unwrap_or_else(|e| e.into_inner());
        let stats = map.entry(provider_id.to_string()).or_default();
        stats.executions += 1;
        if success {
            stats.successes += 1;
        }
        stats.total_latency_ms += latency.as_millis() as u64;
        stats.last_executed = Some(Utc::now());
    }

    pub fn get(&self, provider_id: &str) -> ProviderStats {
        let map = self.per_provider.lock().unwrap_or_else(|e| e.into_inner());
        map.get(provider_id).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self, total_loaded: usize) -> RegistryStatistics {
        let per_provider = self
            .per_provider
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let total_executions: u64 = per_provider.values().map(|s| s.executions).sum();
        let successful_executions: u64 = per_provider.values().map(|s| s.successes).sum();
        RegistryStatistics {
            total_loaded,
            total_executions,
            successful_executions,
            success_rate: if total_executions == 0 {
                0.0
            } else {
                successful_executions as f64 / total_executions as f64
            },
            per_provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_per_provider_and_total() {
        let log = ExecutionLog::default();
        log.record("A", true, Duration::from_millis(100));
        log.record("A", false, Duration::from_millis(300));
        log.record("B", true, Duration::from_millis(50));

        let a = log.get("A");
        assert_eq!(a.executions, 2);
        assert!((a.success_rate() - 0.5).abs() < f64::EPSILON);
        assert!((a.average_latency_ms() - 200.0).abs() < f64::EPSILON);

        let stats = log.snapshot(2);
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 2);
        assert_eq!(stats.total_loaded, 2);
        assert_eq!(log.get("missing"), ProviderStats::default());
    }
}
