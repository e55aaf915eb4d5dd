//! Shared state every route handler reads from.

use std::sync::Arc;

use toolhost_core::config::Config;
use toolhost_core::health::HealthRegistry;
use toolhost_dispatch::{Collective, Dispatcher};
use toolhost_persistence::PersistenceManager;
use toolhost_registry::ToolRegistry;
use toolhost_rpc::handler::{JsonRpcHandler, ShutdownSignal};

use crate::active_requests::ActiveRequests;
use crate::metrics::MetricsProvider;
use crate::sse::SseBroadcaster;

#[derive(Clone)]
pub struct AppState {
    pub rpc: Arc<JsonRpcHandler>,
    pub registry: Arc<ToolRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub persistence: Arc<PersistenceManager>,
    pub health: Arc<HealthRegistry>,
    pub sse: Arc<SseBroadcaster>,
    pub collective: Arc<dyn Collective>,
    pub metrics: Option<Arc<dyn MetricsProvider>>,
    pub active_requests: ActiveRequests,
    pub shutdown: Arc<ShutdownSignal>,
    pub config: Arc<Config>,
}
