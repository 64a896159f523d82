//! Session tier: conversation turns grouped into sessions per user.
//!
//! Each user has at most one active session. A session that has been idle
//! longer than the idle TTL is no longer active; the next turn starts a new
//! one. Ended and idle sessions remain readable through
//! [`SessionStore::summary`] until they have been idle for the retention
//! period, after which [`SessionStore::purge_expired`] drops them.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchyard_core::{QueryMode, Turn};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub mode: QueryMode,
    pub started_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
    pub turn_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Full view of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub info: SessionInfo,
    pub turns: Vec<Turn>,
    /// Provider ids that contributed `agent:<id>` turns.
    pub providers_used: BTreeSet<String>,
}

struct Session {
    info: SessionInfo,
    turns: Vec<Turn>,
    last_activity: Instant,
}

#[derive(Default)]
struct Inner {
    active: HashMap<String, String>,
    sessions: HashMap<String, Session>,
}

impl Inner {
    /// The user's active session id, unless it ended or went idle.
    fn live_session(&self, user_id: &str, idle: Duration, now: Instant) -> Option<&str> {
        let id = self.active.get(user_id)?;
        let session = self.sessions.get(id)?;
        let fresh = session.info.ended_at.is_none() && now.duration_since(session.last_activity) <= idle;
        fresh.then_some(id.as_str())
    }

    fn open(&mut self, user_id: &str, mode: QueryMode, title: Option<String>, now: Instant) -> SessionInfo {
        let started = Utc::now();
        let info = SessionInfo {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.unwrap_or_else(|| format!("Session {}", started.format("%Y-%m-%d %H:%M"))),
            mode,
            started_at: started,
            last_at: started,
            turn_count: 0,
            ended_at: None,
        };
        debug!(user = %user_id, session = %info.session_id, "Session started");
        self.active.insert(user_id.to_string(), info.session_id.clone());
        self.sessions.insert(
            info.session_id.clone(),
            Session {
                info: info.clone(),
                turns: Vec::new(),
                last_activity: now,
            },
        );
        info
    }
}

pub struct SessionStore {
    idle_ttl: Duration,
    retention: Duration,
    inner: RwLock<Inner>,
}

impl SessionStore {
    /// `retention` is raised to `idle_ttl` if shorter, so a live session is
    /// never purged.
    pub fn new(idle_ttl: Duration, retention: Duration) -> Self {
        Self {
            idle_ttl,
            retention: retention.max(idle_ttl),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Start a new session, ending the user's current one if any.
    pub async fn start(&self, user_id: &str, mode: QueryMode, title: Option<String>) -> SessionInfo {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        if let Some(prev) = inner.active.get(user_id).cloned()
            && let Some(session) = inner.sessions.get_mut(&prev)
            && session.info.ended_at.is_none()
        {
            session.info.ended_at = Some(Utc::now());
        }
        inner.open(user_id, mode, title, now)
    }

    pub async fn active(&self, user_id: &str) -> Option<SessionInfo> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        let id = inner.live_session(user_id, self.idle_ttl, now)?;
        inner.sessions.get(id).map(|s| s.info.clone())
    }

    /// Append a turn to the active session, starting one if needed.
    /// Returns the session id the turn landed in.
    pub async fn add_turn(&self, user_id: &str, turn: Turn, mode: QueryMode) -> String {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let existing = inner.live_session(user_id, self.idle_ttl, now).map(str::to_string);
        let id = match existing {
            Some(id) => id,
            None => inner.open(user_id, mode, None, now).session_id,
        };
        if let Some(session) = inner.sessions.get_mut(&id) {
            session.info.last_at = turn.timestamp;
            session.info.turn_count += 1;
            session.turns.push(turn);
            session.last_activity = now;
        }
        id
    }

    /// Up to `limit` turns of the active session, most recent first.
    pub async fn context(&self, user_id: &str, limit: usize) -> Vec<Turn> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        inner
            .live_session(user_id, self.idle_ttl, now)
            .and_then(|id| inner.sessions.get(id))
            .map(|s| s.turns.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// End the active session. Returns its final info.
    pub async fn end(&self, user_id: &str) -> Option<SessionInfo> {
        let mut inner = self.inner.write().await;
        let id = inner.active.remove(user_id)?;
        let session = inner.sessions.get_mut(&id)?;
        if session.info.ended_at.is_none() {
            session.info.ended_at = Some(Utc::now());
        }
        Some(session.info.clone())
    }

    pub async fn summary(&self, session_id: &str) -> Option<SessionSummary> {
        let inner = self.inner.read().await;
        let session = inner.sessions.get(session_id)?;
        let providers_used = session
            .turns
            .iter()
            .filter_map(|t| t.role.strip_prefix("agent:").map(str::to_string))
            .collect();
        Some(SessionSummary {
            info: session.info.clone(),
            turns: session.turns.clone(),
            providers_used,
        })
    }

    /// Drop sessions idle longer than the retention period, along with any
    /// active pointer to them. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        let retention = self.retention;
        inner
            .sessions
            .retain(|_, s| now.duration_since(s.last_activity) <= retention);
        let Inner { active, sessions } = &mut *inner;
        active.retain(|_, id| sessions.contains_key(id));

        let removed = before - inner.sessions.len();
        if removed > 0 {
            debug!(removed, remaining = inner.sessions.len(), "Expired sessions purged");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Every session for a user, newest first.
    pub async fn sessions_for_user(&self, user_id: &str) -> Vec<SessionInfo> {
        let inner = self.inner.read().await;
        let mut infos: Vec<SessionInfo> = inner
            .sessions
            .values()
            .filter(|s| s.info.user_id == user_id)
            .map(|s| s.info.clone())
            .collect();
        infos.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        infos
    }
}
