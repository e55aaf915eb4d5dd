//! Owns the fallback chain and hands out per-domain adapters.

use std::sync::Arc;

use serde::Serialize;
use toolhost_core::config::Config;
use toolhost_core::health::SubsystemHealth;

use crate::adapter::Adapter;
use crate::backend::{Backend, BackendKind};
use crate::domain;
use crate::durable::DurableBackend;
use crate::file::FileBackend;
use crate::memory::MemoryBackend;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub postgres: HealthEntry,
    pub file: HealthEntry,
    pub cache: HealthEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthEntry {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&SubsystemHealth> for HealthEntry {
    fn from(health: &SubsystemHealth) -> Self {
        let status = match health.status {
            toolhost_core::health::HealthLabel::Healthy => "healthy",
            toolhost_core::health::HealthLabel::Unhealthy => "unhealthy",
            toolhost_core::health::HealthLabel::ConnectionFailed => "connection_failed",
            toolhost_core::health::HealthLabel::NotConfigured => "not_configured",
        };
        Self { status, reason: health.reason.clone() }
    }
}

pub struct PersistenceManager {
    backend: Arc<dyn Backend>,
    durable_connect_error: Option<String>,
    cache_configured: bool,
}

impl PersistenceManager {
    /// Picks durable (if configured and reachable) else file (if a data
    /// directory was given) else memory. Connection failures at this stage
    /// are recorded, not fatal.
    pub async fn initialize(config: &Config) -> Self {
        let mut durable_connect_error = None;

        if let Some(url) = &config.durable_url {
            match DurableBackend::connect(url).await {
                Ok(backend) => {
                    return Self {
                        backend: Arc::new(backend),
                        durable_connect_error: None,
                        cache_configured: config.cache_url.is_some(),
                    };
                }
                Err(err) => {
                    tracing::warn!(error = %err, "durable store unavailable, falling back");
                    durable_connect_error = Some(err.to_string());
                }
            }
        }

        if let Some(data_dir) = &config.data_dir {
            match FileBackend::open(data_dir).await {
                Ok(backend) => {
                    return Self {
                        backend: Arc::new(backend),
                        durable_connect_error,
                        cache_configured: config.cache_url.is_some(),
                    };
                }
                Err(err) => {
                    tracing::warn!(error = %err, "file store unavailable, falling back to memory");
                }
            }
        }

        Self {
            backend: Arc::new(MemoryBackend::new()),
            durable_connect_error,
            cache_configured: config.cache_url.is_some(),
        }
    }

    /// The active backend's label (`"durable"`, `"file"`, or `"memory"`).
    pub fn active_backend(&self) -> &'static str {
        self.backend.kind().label()
    }

    /// Hands out an adapter for `domain`. `domain` should be one of the
    /// constants in [`crate::domain`].
    pub fn adapter(&self, domain: &'static str) -> Adapter {
        Adapter::new(Arc::clone(&self.backend), domain)
    }

    /// True for every known domain: once a backend is chosen, every adapter
    /// over it can service reads and writes.
    pub fn capabilities(&self) -> std::collections::BTreeMap<&'static str, bool> {
        domain::ALL.iter().map(|name| (*name, true)).collect()
    }

    pub fn health(&self) -> HealthReport {
        let postgres = match (self.backend.kind(), &self.durable_connect_error) {
            (BackendKind::Durable, _) => HealthEntry::from(&SubsystemHealth::healthy()),
            (_, Some(reason)) => HealthEntry::from(&SubsystemHealth::connection_failed(reason.clone())),
            (_, None) => HealthEntry::from(&SubsystemHealth::not_configured()),
        };
        let file = match self.backend.kind() {
            BackendKind::File => HealthEntry::from(&SubsystemHealth::healthy()),
            _ => HealthEntry::from(&SubsystemHealth::not_configured()),
        };
        let cache = if self.cache_configured {
            HealthEntry::from(&SubsystemHealth::healthy())
        } else {
            HealthEntry::from(&SubsystemHealth::not_configured())
        };
        HealthReport { postgres, file, cache }
    }

    /// Flush/close the active backend. Safe to call once during orchestrated
    /// shutdown.
    pub async fn close(&self) {
        self.backend.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_memory_when_nothing_configured() {
        let config = Config::in_memory_for_tests();
        let manager = PersistenceManager::initialize(&config).await;
        assert_eq!(manager.active_backend(), "memory");
        assert!(manager.capabilities()[domain::JUDGMENTS]);
        assert_eq!(manager.health().postgres.status, "not_configured");
    }

    #[tokio::test]
    async fn judgments_round_trip_through_the_memory_backend() {
        let config = Config::in_memory_for_tests();
        let manager = PersistenceManager::initialize(&config).await;
        let adapter = manager.adapter(domain::JUDGMENTS);
        adapter.save("j1", serde_json::json!({"score": 5})).await.unwrap();
        let found = adapter.get("j1").await.unwrap();
        assert_eq!(found["score"], 5);
    }

    #[tokio::test]
    async fn falls_back_to_file_when_data_dir_is_set_and_no_durable_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::in_memory_for_tests();
        config.data_dir = Some(dir.path().to_path_buf());
        let manager = PersistenceManager::initialize(&config).await;
        assert_eq!(manager.active_backend(), "file");
    }
}
