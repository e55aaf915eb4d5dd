//! Wires every other crate into a runnable server: the Service Initializer,
//! the fixed bus subscriptions (metrics, SSE bridge, peer forwarding), and
//! the Server Orchestrator's startup/shutdown sequence.

pub mod forwarding;
pub mod initializer;
pub mod metrics;
pub mod orchestrator;
pub mod services;

pub mod prelude {
    pub use crate::initializer::{InitError, ServiceInitializer};
    pub use crate::metrics::MetricsCollector;
    pub use crate::orchestrator::{ServerOrchestrator, StartupError};
    pub use crate::services::{build_services, Services, Teardown};
}
