//! Builds the full subsystem graph via the [`ServiceInitializer`] and wires
//! the fixed bus subscriptions the Service Initializer owns: metrics,
//! judgment forwarding to peers, and a notification hook into the
//! collective standing in for the learning pipeline (out of core scope).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use toolhost_core::config::Config;
use toolhost_core::health::{HealthIndicator, HealthRegistry, SubsystemHealth};
use toolhost_core::types::HookType;
use toolhost_dispatch::{Collective, Dispatcher};
use toolhost_events::{EventBus, Subscription};
use toolhost_persistence::PersistenceManager;
use toolhost_poj::PojChainManager;
use toolhost_registry::{ToolFactory, ToolRegistry};
use toolhost_rpc::handler::{JsonRpcHandler, ServerControl, ServerIdentity, ShutdownSignal};
use toolhost_session::SessionManager;
use toolhost_http::active_requests::ActiveRequests;
use toolhost_http::sse::SseBroadcaster;

use crate::forwarding::JudgmentForwarder;
use crate::initializer::{InitError, ServiceInitializer};
use crate::metrics::MetricsCollector;

pub struct Services {
    pub config: Arc<Config>,
    pub bus: EventBus,
    pub persistence: Arc<PersistenceManager>,
    pub sessions: Arc<SessionManager>,
    pub poj: Arc<PojChainManager>,
    pub registry: Arc<ToolRegistry>,
    pub collective: Arc<dyn Collective>,
    pub dispatcher: Arc<Dispatcher>,
    pub health: Arc<HealthRegistry>,
    pub shutdown: Arc<ShutdownSignal>,
    pub rpc: Arc<JsonRpcHandler>,
    pub metrics: Arc<MetricsCollector>,
    pub sse: Arc<SseBroadcaster>,
    /// Shared with the HTTP Adapter's [`toolhost_http::AppState`] so the
    /// orchestrator's shutdown sequence can drain the same counter the
    /// route handlers increment, rather than tracking a second one.
    pub active_requests: ActiveRequests,
}

/// Every unsubscribe handle the initializer owns, torn down in reverse
/// order of registration.
pub struct Teardown {
    subscriptions: Vec<Subscription>,
}

impl Teardown {
    pub fn close(self) {
        for sub in self.subscriptions.into_iter().rev() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sub.unsubscribe()));
            if let Err(panic) = result {
                tracing::error!(?panic, "bus unsubscribe handler panicked during teardown");
            }
        }
    }
}

struct PersistenceHealthIndicator {
    persistence: Arc<PersistenceManager>,
}

impl HealthIndicator for PersistenceHealthIndicator {
    fn name(&self) -> &str {
        "database"
    }
    fn check(&self) -> Pin<Box<dyn Future<Output = SubsystemHealth> + Send + '_>> {
        Box::pin(async move {
            let report = self.persistence.health();
            match self.persistence.active_backend() {
                "durable" => SubsystemHealth::healthy(),
                "file" => SubsystemHealth::healthy(),
                _ => match report.postgres.reason {
                    Some(reason) => SubsystemHealth::connection_failed(reason),
                    None => SubsystemHealth::not_configured(),
                },
            }
        })
    }
}

struct CacheHealthIndicator {
    persistence: Arc<PersistenceManager>,
}

impl HealthIndicator for CacheHealthIndicator {
    fn name(&self) -> &str {
        "cache"
    }
    fn critical(&self) -> bool {
        false
    }
    fn check(&self) -> Pin<Box<dyn Future<Output = SubsystemHealth> + Send + '_>> {
        Box::pin(async move {
            match self.persistence.health().cache.status {
                "healthy" => SubsystemHealth::healthy(),
                _ => SubsystemHealth::not_configured(),
            }
        })
    }
}

struct PojHealthIndicator {
    poj: Arc<PojChainManager>,
}

impl HealthIndicator for PojHealthIndicator {
    fn name(&self) -> &str {
        "poj_chain"
    }
    fn check(&self) -> Pin<Box<dyn Future<Output = SubsystemHealth> + Send + '_>> {
        Box::pin(async move {
            let report = self.poj.verify_chain().await;
            if report.valid {
                SubsystemHealth::healthy()
            } else {
                SubsystemHealth::unhealthy(format!("{} hash-link mismatch(es) detected", report.error_count))
            }
        })
    }
}

struct AnchoringHealthIndicator {
    enabled: bool,
}

impl HealthIndicator for AnchoringHealthIndicator {
    fn name(&self) -> &str {
        "anchoring"
    }
    fn critical(&self) -> bool {
        false
    }
    fn check(&self) -> Pin<Box<dyn Future<Output = SubsystemHealth> + Send + '_>> {
        let enabled = self.enabled;
        Box::pin(async move { if enabled { SubsystemHealth::healthy() } else { SubsystemHealth::not_configured() } })
    }
}

/// Assembles every subsystem in dependency order and wires the fixed bus
/// subscriptions. `collective` and `tool_factories` are supplied by the
/// caller since both are pluggable, out-of-core-scope collaborators.
pub async fn build_services(
    config: Arc<Config>,
    collective: Arc<dyn Collective>,
    tool_factories: Vec<Arc<dyn ToolFactory>>,
) -> Result<(Services, Teardown), InitError> {
    let mut init = ServiceInitializer::new();
    init.provide("config", Arc::clone(&config));

    init.register("bus", vec![], |_bag| async { EventBus::new() });

    init.register("persistence", vec!["config"], |bag| async move {
        let config = bag.get::<Config>("config").expect("config provided");
        PersistenceManager::initialize(&config).await
    });

    init.register("sessions", vec!["persistence", "bus"], |bag| async move {
        let persistence = bag.get::<PersistenceManager>("persistence").expect("persistence built");
        let bus = bag.get::<EventBus>("bus").expect("bus built");
        SessionManager::new(&persistence, (*bus).clone())
    });

    init.register("poj", vec!["persistence", "bus", "config"], |bag| async move {
        let persistence = bag.get::<PersistenceManager>("persistence").expect("persistence built");
        let bus = bag.get::<EventBus>("bus").expect("bus built");
        let config = bag.get::<Config>("config").expect("config provided");
        let manager = PojChainManager::new(&persistence, (*bus).clone(), config.poj_batch_size, config.poj_batch_interval).await;
        // `PojChainManager::new` already hands back an `Arc`; unwrap it so
        // the initializer's own `Arc::new` wrapping keeps the bag's
        // convention of one `Arc` layer per entry. Freshly constructed, so
        // no other strong reference exists yet.
        match Arc::try_unwrap(manager) {
            Ok(manager) => manager,
            Err(_) => unreachable!("poj chain manager has no other owners at construction time"),
        }
    });

    init.register("registry", vec!["persistence", "sessions", "bus", "poj"], move |bag| async move {
        let mut services = toolhost_core::services::ServiceBag::new();
        services.insert("persistence", bag.get::<PersistenceManager>("persistence").expect("persistence built"));
        services.insert("sessions", bag.get::<SessionManager>("sessions").expect("sessions built"));
        services.insert("bus", bag.get::<EventBus>("bus").expect("bus built"));
        services.insert("poj", bag.get::<PojChainManager>("poj").expect("poj built"));

        let mut registry = ToolRegistry::new();
        for factory in tool_factories {
            registry.register(factory);
        }
        registry.create_all(&services);
        registry
    });

    let dispatcher_collective = Arc::clone(&collective);
    init.register("dispatcher", vec!["registry", "sessions", "bus"], move |bag| async move {
        let registry = bag.get::<ToolRegistry>("registry").expect("registry built");
        let sessions = bag.get::<SessionManager>("sessions").expect("sessions built");
        let bus = bag.get::<EventBus>("bus").expect("bus built");
        Dispatcher::new(registry, sessions, (*bus).clone(), dispatcher_collective)
    });

    init.register("health_registry", vec!["persistence", "poj", "config"], |bag| async move {
        let persistence = bag.get::<PersistenceManager>("persistence").expect("persistence built");
        let poj = bag.get::<PojChainManager>("poj").expect("poj built");
        let config = bag.get::<Config>("config").expect("config provided");
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(PersistenceHealthIndicator { persistence: Arc::clone(&persistence) }));
        registry.register(Arc::new(CacheHealthIndicator { persistence }));
        registry.register(Arc::new(PojHealthIndicator { poj }));
        registry.register(Arc::new(AnchoringHealthIndicator { enabled: config.anchoring_enabled }));
        registry
    });

    init.register("shutdown_signal", vec![], |_bag| async { ShutdownSignal::new() });

    init.register("metrics", vec!["bus"], |_bag| async { MetricsCollector::new() });

    init.register("sse", vec!["bus"], |_bag| async { SseBroadcaster::new(SSE_CHANNEL_CAPACITY) });

    init.register("rpc_handler", vec!["registry", "dispatcher", "shutdown_signal"], |bag| async move {
        let registry = bag.get::<ToolRegistry>("registry").expect("registry built");
        let dispatcher = bag.get::<Dispatcher>("dispatcher").expect("dispatcher built");
        let shutdown = bag.get::<ShutdownSignal>("shutdown_signal").expect("shutdown signal built");
        JsonRpcHandler::new(
            registry,
            dispatcher,
            ServerIdentity { name: "toolhost".into(), version: env!("CARGO_PKG_VERSION").into() },
            shutdown as Arc<dyn ServerControl>,
        )
    });

    let bag = init.resolve().await?;

    let bus = (*bag.get::<EventBus>("bus").expect("bus built")).clone();
    let config = bag.get::<Config>("config").expect("config provided");
    let persistence = bag.get::<PersistenceManager>("persistence").expect("persistence built");
    let sessions = bag.get::<SessionManager>("sessions").expect("sessions built");
    let poj = bag.get::<PojChainManager>("poj").expect("poj built");
    let registry = bag.get::<ToolRegistry>("registry").expect("registry built");
    let dispatcher = bag.get::<Dispatcher>("dispatcher").expect("dispatcher built");
    let health = bag.get::<HealthRegistry>("health_registry").expect("health registry built");
    let shutdown = bag.get::<ShutdownSignal>("shutdown_signal").expect("shutdown signal built");
    let metrics = bag.get::<MetricsCollector>("metrics").expect("metrics built");
    let rpc = bag.get::<JsonRpcHandler>("rpc_handler").expect("rpc handler built");
    let sse = bag.get::<SseBroadcaster>("sse").expect("sse broadcaster built");

    let mut subscriptions = metrics.install(&bus);

    // Bridge the fixed set of internally-originated events to SSE clients;
    // `/hooks/event` broadcasts its own `hook:received`/`tool_pre`/`tool_post`
    // inline, this covers the same event names when they originate from a
    // dispatcher call made via `/mcp` or `/api/tools/{name}` instead.
    for event_name in ["tool_pre", "tool_post", "judgment:created", "poj:block:created"] {
        let sse = Arc::clone(&sse);
        subscriptions.push(bus.subscribe(event_name, move |event| {
            sse.broadcast(&event.name, event.payload.to_string());
        }));
    }

    let forwarder = JudgmentForwarder::new(config.peer_nodes.clone());
    if let Some(sub) = forwarder.install(&bus) {
        subscriptions.push(sub);
    }

    // Route domain events into the collective: the learning pipeline itself
    // is an out-of-core-scope collaborator, so this is the wiring point, not
    // an implementation of it.
    let learning_sink = Arc::clone(&collective);
    subscriptions.push(bus.subscribe("judgment:created", move |event| {
        let learning_sink = Arc::clone(&learning_sink);
        let payload = event.payload.clone();
        tokio::spawn(async move {
            learning_sink.receive_hook_event(HookType::Notification, payload).await;
        });
    }));

    poj.spawn_batch_timer();

    let active_requests = ActiveRequests::new();

    Ok((
        Services {
            config,
            bus,
            persistence,
            sessions,
            poj,
            registry,
            collective,
            dispatcher,
            health,
            shutdown,
            rpc,
            metrics,
            sse,
            active_requests,
        },
        Teardown { subscriptions },
    ))
}

const SSE_CHANNEL_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;
    use toolhost_dispatch::NoopCollective;

    #[tokio::test]
    async fn builds_every_subsystem_and_tears_down_without_panicking() {
        let config = Arc::new(Config::in_memory_for_tests());
        let (services, teardown) = build_services(config, Arc::new(NoopCollective), Vec::new()).await.unwrap();
        assert_eq!(services.registry.list().len(), 0);
        let snapshot = services.health.aggregate().await;
        assert!(snapshot.subsystems.contains_key("database"));
        assert!(snapshot.subsystems.contains_key("poj_chain"));
        teardown.close();
    }
}
