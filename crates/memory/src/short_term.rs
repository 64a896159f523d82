//! Short-term tier: per-(user, provider) values with a TTL.
//!
//! Expiry is measured on `tokio::time::Instant`, so tests can pause and
//! advance the clock. Expired slots are invisible to reads and removed by
//! [`ShortTermCache::purge_expired`] or overwritten by the next `set`.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A live short-term value, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortTermRecord {
    pub user_id: String,
    pub provider_id: String,
    pub value: serde_json::Value,
    pub written_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Slot {
    value: serde_json::Value,
    written: Instant,
    expires: Instant,
    written_at: DateTime<Utc>,
    ttl: Duration,
}

impl Slot {
    fn live(&self, now: Instant) -> bool {
        now < self.expires
    }

    fn to_record(&self, user_id: &str, provider_id: &str) -> ShortTermRecord {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        ShortTermRecord {
            user_id: user_id.to_string(),
            provider_id: provider_id.to_string(),
            value: self.value.clone(),
            written_at: self.written_at,
            expires_at: self.written_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

type Key = (String, String);

pub struct ShortTermCache {
    default_ttl: Duration,
    slots: RwLock<HashMap<Key, Slot>>,
}

impl ShortTermCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Write a value; `ttl` defaults to the cache's TTL. Last write wins.
    pub async fn set(&self, user_id: &str, provider_id: &str, value: serde_json::Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let now = Instant::now();
        let slot = Slot {
            value,
            written: now,
            expires: now + ttl,
            written_at: Utc::now(),
            ttl,
        };
        self.slots
            .write()
            .await
            .insert((user_id.to_string(), provider_id.to_string()), slot);
    }

    /// Read a value if present and not expired.
    pub async fn get(&self, user_id: &str, provider_id: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        let slots = self.slots.read().await;
        slots
            .get(&(user_id.to_string(), provider_id.to_string()))
            .filter(|s| s.live(now))
            .map(|s| s.value.clone())
    }

    /// All live values for a user, ordered by provider id.
    pub async fn all_for_user(&self, user_id: &str) -> Vec<ShortTermRecord> {
        let now = Instant::now();
        let slots = self.slots.read().await;
        let mut records: Vec<ShortTermRecord> = slots
            .iter()
            .filter(|((u, _), s)| u == user_id && s.live(now))
            .map(|((u, p), s)| s.to_record(u, p))
            .collect();
        records.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        records
    }

    /// Live values for a user written within `window`, most recent first.
    pub async fn recent(&self, user_id: &str, window: Duration) -> Vec<ShortTermRecord> {
        let now = Instant::now();
        let slots = self.slots.read().await;
        let mut hits: Vec<(Instant, ShortTermRecord)> = slots
            .iter()
            .filter(|((u, _), s)| u == user_id && s.live(now) && now.duration_since(s.written) <= window)
            .map(|((u, p), s)| (s.written, s.to_record(u, p)))
            .collect();
        hits.sort_by(|(a, ra), (b, rb)| b.cmp(a).then_with(|| ra.provider_id.cmp(&rb.provider_id)));
        hits.into_iter().map(|(_, r)| r).collect()
    }

    /// Forget a slot. Returns whether it held a live value.
    pub async fn remove(&self, user_id: &str, provider_id: &str) -> bool {
        let now = Instant::now();
        self.slots
            .write()
            .await
            .remove(&(user_id.to_string(), provider_id.to_string()))
            .is_some_and(|s| s.live(now))
    }

    /// Drop expired slots; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, s| s.live(now));
        before - slots.len()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}
