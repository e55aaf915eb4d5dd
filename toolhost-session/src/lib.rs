//! Deterministic per-(user, project) session lifecycle: cache + durable
//! store coordination and monotonic counters.
//!
//! The cache is a `DashMap`, grounded on the teacher's `r2e-cache::TtlCache`
//! shape (a `DashMap`-backed concurrent map) but without a TTL — sessions
//! live until `endSession` removes them explicitly, not on a timer.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use toolhost_events::{EventBus, PublishOptions};
use toolhost_persistence::{domain, PersistenceManager};

const DEFAULT_PROJECT: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCounters {
    pub judgments: u64,
    pub digests: u64,
    pub feedback: u64,
    /// Handler exceptions attributed to this session, excluding hook blocks
    /// (those are not counted as errors per the error-handling contract).
    #[serde(default)]
    pub errors: u64,
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self { judgments: 0, digests: 0, feedback: 0, errors: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub project: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub counters: SessionCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndSessionResult {
    pub ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub active_sessions: usize,
    pub current_session_id: Option<String>,
}

/// Deterministic session id for `(user_id, project)`, stable across restarts.
///
/// Per the documented Open Question resolution: the source also had a random
/// id path for some callers, but tests show the deterministic behavior is
/// the one that matters — every path here uses it uniformly.
pub fn derive_session_id(user_id: &str, project: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(project.as_bytes());
    format!("sess_{}", hex::encode(&hasher.finalize()[..12]))
}

fn cache_key(user_id: &str, project: &str) -> String {
    format!("{user_id}:{project}")
}

pub struct SessionManager {
    cache: DashMap<String, Session>,
    current: RwLock<Option<String>>,
    adapter: toolhost_persistence::Adapter,
    bus: EventBus,
}

impl SessionManager {
    pub fn new(persistence: &PersistenceManager, bus: EventBus) -> Self {
        Self {
            cache: DashMap::new(),
            current: RwLock::new(None),
            adapter: persistence.adapter(domain::SESSIONS),
            bus,
        }
    }

    fn resolve_project(project: Option<&str>) -> String {
        project.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PROJECT).to_string()
    }

    /// Returns the cached session for `(user_id, project)`, refreshing its
    /// last-activity time, or creates and caches a fresh one.
    pub async fn get_or_create_session(
        &self,
        user_id: &str,
        project: Option<&str>,
        ctx: Option<serde_json::Value>,
    ) -> Session {
        let project = Self::resolve_project(project);
        let key = cache_key(user_id, &project);

        if let Some(mut existing) = self.cache.get_mut(&key) {
            existing.last_activity_at = Utc::now();
            *self.current.write().expect("session current lock poisoned") = Some(existing.id.clone());
            return existing.clone();
        }

        let now = Utc::now();
        let session = Session {
            id: derive_session_id(user_id, &project),
            user_id: user_id.to_string(),
            project: project.clone(),
            created_at: now,
            last_activity_at: now,
            counters: SessionCounters::default(),
            context: ctx,
        };

        let record = serde_json::to_value(&session).expect("session serializes");
        if let Err(err) = self.adapter.save(&session.id, record).await {
            tracing::error!(session_id = %session.id, error = %err, "failed to persist new session");
        }

        self.cache.insert(key, session.clone());
        *self.current.write().expect("session current lock poisoned") = Some(session.id.clone());

        self.bus.publish(
            "session:started",
            serde_json::json!({"sessionId": session.id, "userId": user_id, "project": project}),
            PublishOptions { source: Some("session-manager".into()), timestamp: None },
        );

        session
    }

    /// `getOrCreateSession` with explicit replacement: end any existing entry
    /// for `(user_id, project)` before creating a fresh one.
    pub async fn start_session(
        &self,
        user_id: &str,
        project: Option<&str>,
        ctx: Option<serde_json::Value>,
    ) -> Session {
        let project = Self::resolve_project(project);
        let key = cache_key(user_id, &project);
        if let Some(existing) = self.cache.get(&key).map(|entry| entry.id.clone()) {
            self.end_session(&existing).await;
        }
        self.get_or_create_session(user_id, Some(&project), ctx).await
    }

    /// Flushes counters to the durable repository, then removes the session
    /// from cache and store. Unknown ids return `{ended: false, ...}` rather
    /// than raising.
    pub async fn end_session(&self, session_id: &str) -> EndSessionResult {
        let key = self
            .cache
            .iter()
            .find(|entry| entry.value().id == session_id)
            .map(|entry| entry.key().clone());

        let Some(key) = key else {
            return EndSessionResult { ended: false, reason: Some("session_not_found".into()) };
        };

        if let Some((_, session)) = self.cache.remove(&key) {
            let record = serde_json::to_value(&session).expect("session serializes");
            if let Err(err) = self.adapter.save(&session.id, record).await {
                tracing::error!(session_id = %session.id, error = %err, "failed to flush session counters on end");
            }
        }

        let mut current = self.current.write().expect("session current lock poisoned");
        if current.as_deref() == Some(session_id) {
            *current = None;
        }
        drop(current);

        self.bus.publish(
            "session:ended",
            serde_json::json!({"sessionId": session_id}),
            PublishOptions { source: Some("session-manager".into()), timestamp: None },
        );

        EndSessionResult { ended: true, reason: None }
    }

    /// Increments `field` on the current session in cache, best-effort
    /// propagating to the durable repository. No-op if there is no current
    /// session.
    pub async fn increment_counter(&self, field: &str) {
        let current_id = self.current.read().expect("session current lock poisoned").clone();
        let Some(current_id) = current_id else { return };

        let key = self
            .cache
            .iter()
            .find(|entry| entry.value().id == current_id)
            .map(|entry| entry.key().clone());
        let Some(key) = key else { return };

        let updated = {
            let Some(mut entry) = self.cache.get_mut(&key) else { return };
            match field {
                "judgments" => entry.counters.judgments += 1,
                "digests" => entry.counters.digests += 1,
                "feedback" => entry.counters.feedback += 1,
                "errors" => entry.counters.errors += 1,
                other => {
                    tracing::warn!(field = other, "unknown session counter field");
                    return;
                }
            }
            entry.last_activity_at = Utc::now();
            entry.clone()
        };

        let record = serde_json::to_value(&updated).expect("session serializes");
        if let Err(err) = self.adapter.save(&updated.id, record).await {
            tracing::error!(session_id = %updated.id, error = %err, "best-effort counter propagation failed");
        }
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.current.read().expect("session current lock poisoned").clone()
    }

    pub fn get_summary(&self) -> SessionSummary {
        SessionSummary {
            active_sessions: self.cache.len(),
            current_session_id: self.current_session_id(),
        }
    }

    /// Snapshot of cached sessions keyed by `(user, project)`, for tests and
    /// admin inspection.
    pub fn cached_sessions(&self) -> HashMap<String, Session> {
        self.cache.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }
}
