//! The Server Orchestrator: owns the constructed subsystems and drives the
//! fixed startup/shutdown sequence across both transport modes.
//!
//! Grounded on the teacher's `AppBuilder::serve` / `shutdown_signal`
//! (`quarlus-core::builder`) for the graceful-shutdown shape, generalized
//! to the two-transport-mode startup this design calls for instead of the
//! teacher's single HTTP listener.

use std::sync::Arc;

use tokio::io;
use tokio::net::TcpListener;

use toolhost_core::config::{Config, TransportMode};
use toolhost_dispatch::Collective;
use toolhost_registry::ToolFactory;
use toolhost_rpc::stream;

use crate::services::{build_services, Services, Teardown};

/// Wraps `initializer::InitError` and the handful of startup failures that
/// can occur outside it (binding the HTTP listener).
#[derive(Debug)]
pub enum StartupError {
    Init(crate::initializer::InitError),
    Bind(std::io::Error),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Init(err) => write!(f, "service initialization failed: {err}"),
            StartupError::Bind(err) => write!(f, "failed to bind HTTP listener: {err}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<crate::initializer::InitError> for StartupError {
    fn from(err: crate::initializer::InitError) -> Self {
        StartupError::Init(err)
    }
}

pub struct ServerOrchestrator {
    config: Arc<Config>,
    services: Option<Services>,
    teardown: Option<Teardown>,
    http_handle: Option<tokio::task::JoinHandle<()>>,
    stream_handle: Option<tokio::task::JoinHandle<()>>,
    /// Clone of the state handed to the HTTP Adapter's router, kept so
    /// `shutdown` can drive [`toolhost_http::graceful_shutdown`] on the same
    /// active-request counter the route handlers increment.
    http_state: Option<toolhost_http::AppState>,
}

impl ServerOrchestrator {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            services: None,
            teardown: None,
            http_handle: None,
            stream_handle: None,
            http_state: None,
        }
    }

    /// Runs the Service Initializer, assigns the returned subsystems, and
    /// starts the transport selected by `config.transport_mode`, then
    /// returns immediately in both modes: the stream reader and the HTTP
    /// listener both run as background tasks the caller later waits on
    /// with [`Self::wait_for_stream_exit`] or its own signal handling.
    pub async fn start(
        &mut self,
        collective: Arc<dyn Collective>,
        tool_factories: Vec<Arc<dyn ToolFactory>>,
    ) -> Result<(), StartupError> {
        let (services, teardown) = build_services(Arc::clone(&self.config), collective, tool_factories).await?;

        // Identity and tool inventory go to stderr unconditionally: in
        // stream mode stdout is the JSON-RPC channel and must stay clean.
        eprintln!("toolhost {} starting ({:?} transport)", env!("CARGO_PKG_VERSION"), self.config.transport_mode);
        for descriptor in services.registry.list() {
            eprintln!("  tool: {}", descriptor.name);
        }

        match self.config.transport_mode {
            TransportMode::Stream => {
                self.start_stream(&services);
            }
            TransportMode::Http => {
                self.start_http(&services).await?;
            }
        }

        self.services = Some(services);
        self.teardown = Some(teardown);
        Ok(())
    }

    fn start_stream(&mut self, services: &Services) {
        let handler = Arc::clone(&services.rpc);
        // Runs until EOF; stream mode's contract is to exit the process
        // once this completes, which `wait_for_stream_exit` waits on.
        self.stream_handle = Some(tokio::spawn(async move {
            let stdin = io::stdin();
            let stdout = io::stdout();
            stream::run(&handler, tokio::io::BufReader::new(stdin), stdout).await;
        }));
    }

    /// Blocks until the stream transport hits end-of-stream. A no-op in
    /// HTTP mode, where there is no stdin reader to wait on.
    pub async fn wait_for_stream_exit(&mut self) {
        if let Some(handle) = self.stream_handle.take() {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "stream transport task panicked");
            }
        }
    }

    async fn start_http(&mut self, services: &Services) -> Result<(), StartupError> {
        let addr = format!("0.0.0.0:{}", self.config.http_port);
        let listener = TcpListener::bind(&addr).await.map_err(StartupError::Bind)?;
        tracing::info!(%addr, "http adapter listening");

        let state = toolhost_http::AppState {
            rpc: Arc::clone(&services.rpc),
            registry: Arc::clone(&services.registry),
            dispatcher: Arc::clone(&services.dispatcher),
            persistence: Arc::clone(&services.persistence),
            health: Arc::clone(&services.health),
            sse: Arc::clone(&services.sse),
            collective: Arc::clone(&services.collective),
            metrics: Some(Arc::clone(&services.metrics) as Arc<dyn toolhost_http::metrics::MetricsProvider>),
            active_requests: services.active_requests.clone(),
            shutdown: Arc::clone(&services.shutdown),
            config: Arc::clone(&services.config),
        };
        self.http_state = Some(state.clone());
        let app = toolhost_http::build_router(state);

        let shutdown = Arc::clone(&services.shutdown);
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await;
            if let Err(err) = result {
                tracing::error!(error = %err, "http server exited with an error");
            }
        });
        self.http_handle = Some(handle);
        Ok(())
    }

    /// Runs the fixed shutdown sequence: stop the HTTP adapter (if any),
    /// seal a final PoJ block, tear down the fixed bus subscriptions, and
    /// close persistence. `scheduler`/`discovery` are named in the shutdown
    /// order for parity with the wider system but have no concrete
    /// subsystem in this build (out of core scope), so those two steps are
    /// no-ops here.
    pub async fn shutdown(&mut self) {
        let Some(services) = self.services.take() else {
            return;
        };

        services.shutdown.request_stop();

        // Stop accepting new connections (the `shutdown` notify above is what
        // `axum::serve`'s `with_graceful_shutdown` is waiting on) and drain
        // the active-request set before the join handle is awaited, per the
        // documented "stop listening, drain, then close" sequence.
        if let Some(state) = self.http_state.take() {
            toolhost_http::graceful_shutdown(&state).await;
        }

        if let Some(handle) = self.http_handle.take() {
            let grace = self.config.shutdown_grace;
            if tokio::time::timeout(grace, handle).await.is_err() {
                tracing::warn!("http adapter did not stop within the shutdown grace period");
            }
        }

        if let Some(handle) = self.stream_handle.take() {
            handle.abort();
        }

        services.poj.close().await;

        if let Some(teardown) = self.teardown.take() {
            teardown.close();
        }

        // stop scheduler: no scheduler subsystem in this build.
        // shutdown discovery: no discovery subsystem in this build.

        services.persistence.close().await;

        tracing::info!("toolhost shut down cleanly");
    }

    pub fn is_stream_mode(&self) -> bool {
        matches!(self.config.transport_mode, TransportMode::Stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolhost_dispatch::NoopCollective;

    #[tokio::test]
    async fn starts_and_shuts_down_in_http_mode_without_panicking() {
        let mut config = Config::in_memory_for_tests();
        config.transport_mode = TransportMode::Http;
        config.http_port = 0;
        let mut orchestrator = ServerOrchestrator::new(Arc::new(config));
        orchestrator.start(Arc::new(NoopCollective), Vec::new()).await.unwrap();
        orchestrator.shutdown().await;
    }
}
