//! Aggregated health snapshot across named subsystems.
//!
//! Grounded on the teacher's `HealthIndicator` / `HealthState` pattern, but
//! status labels match the persistence contract's vocabulary (`healthy`,
//! `unhealthy`, `connection_failed`, `not_configured`) instead of a plain
//! up/down pair.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLabel {
    Healthy,
    Unhealthy,
    ConnectionFailed,
    NotConfigured,
}

impl HealthLabel {
    pub fn is_critical_failure(&self) -> bool {
        matches!(self, HealthLabel::Unhealthy | HealthLabel::ConnectionFailed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubsystemHealth {
    pub status: HealthLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SubsystemHealth {
    pub fn healthy() -> Self {
        Self { status: HealthLabel::Healthy, reason: None }
    }

    pub fn not_configured() -> Self {
        Self { status: HealthLabel::NotConfigured, reason: None }
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self { status: HealthLabel::Unhealthy, reason: Some(reason.into()) }
    }

    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self { status: HealthLabel::ConnectionFailed, reason: Some(reason.into()) }
    }
}

/// A named subsystem that can report its own health. Critical subsystems
/// count toward the aggregate 503 decision; non-critical ones are reported
/// but never flip the overall status.
pub trait HealthIndicator: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn critical(&self) -> bool {
        true
    }
    fn check(&self) -> Pin<Box<dyn Future<Output = SubsystemHealth> + Send + '_>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub subsystems: BTreeMap<String, SubsystemHealth>,
    pub uptime_seconds: u64,
}

pub struct HealthRegistry {
    indicators: Vec<Arc<dyn HealthIndicator>>,
    start: std::time::Instant,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self { indicators: Vec::new(), start: std::time::Instant::now() }
    }

    pub fn register(&mut self, indicator: Arc<dyn HealthIndicator>) {
        self.indicators.push(indicator);
    }

    pub async fn aggregate(&self) -> HealthSnapshot {
        let mut subsystems = BTreeMap::new();
        let mut healthy = true;
        for indicator in &self.indicators {
            let result = indicator.check().await;
            if indicator.critical() && result.status.is_critical_failure() {
                healthy = false;
            }
            subsystems.insert(indicator.name().to_string(), result);
        }
        HealthSnapshot {
            healthy,
            subsystems,
            uptime_seconds: self.start.elapsed().as_secs(),
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHealthy;
    impl HealthIndicator for AlwaysHealthy {
        fn name(&self) -> &str {
            "always"
        }
        fn check(&self) -> Pin<Box<dyn Future<Output = SubsystemHealth> + Send + '_>> {
            Box::pin(async { SubsystemHealth::healthy() })
        }
    }

    struct AlwaysDown;
    impl HealthIndicator for AlwaysDown {
        fn name(&self) -> &str {
            "down"
        }
        fn check(&self) -> Pin<Box<dyn Future<Output = SubsystemHealth> + Send + '_>> {
            Box::pin(async { SubsystemHealth::unhealthy("boom") })
        }
    }

    #[tokio::test]
    async fn aggregate_is_healthy_when_all_indicators_pass() {
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(AlwaysHealthy));
        let snapshot = registry.aggregate().await;
        assert!(snapshot.healthy);
    }

    #[tokio::test]
    async fn one_critical_failure_flips_the_aggregate() {
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(AlwaysHealthy));
        registry.register(Arc::new(AlwaysDown));
        let snapshot = registry.aggregate().await;
        assert!(!snapshot.healthy);
    }
}
