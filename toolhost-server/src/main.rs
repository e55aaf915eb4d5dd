//! Process entry point: parse CLI overrides, initialise tracing, load
//! config, run the Server Orchestrator, and wait for shutdown.
//!
//! Tracing init follows the teacher's `quarlus_core::init_tracing`
//! (`quarlus-core::layers`); `shutdown_signal` follows
//! `quarlus_core::builder::shutdown_signal` — ctrl-c or SIGTERM, whichever
//! comes first.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use toolhost_core::config::{Config, TransportMode};
use toolhost_dispatch::NoopCollective;
use toolhost_server::orchestrator::ServerOrchestrator;

/// CLI surface is out of core scope beyond the stream-mode exit-on-EOF
/// contract; these two flags just override the environment-derived
/// transport selection for local runs.
#[derive(Parser)]
#[command(name = "toolhost", version, about = "MCP tool-hosting server")]
struct Cli {
    /// Force stream transport regardless of TRANSPORT_MODE.
    #[arg(long, conflicts_with = "http")]
    stream: bool,

    /// Force HTTP transport regardless of TRANSPORT_MODE.
    #[arg(long, conflicts_with = "stream")]
    http: bool,

    /// Override HTTP_PORT when --http is set.
    #[arg(long)]
    port: Option<u16>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load();
    if cli.stream {
        config.transport_mode = TransportMode::Stream;
    } else if cli.http {
        config.transport_mode = TransportMode::Http;
    }
    if let Some(port) = cli.port {
        config.http_port = port;
    }
    let config = Arc::new(config);

    let mut orchestrator = ServerOrchestrator::new(Arc::clone(&config));
    if let Err(err) = orchestrator.start(Arc::new(NoopCollective), Vec::new()).await {
        tracing::error!(error = %err, "startup failed");
        std::process::exit(1);
    }

    match config.transport_mode {
        TransportMode::Stream => {
            // Waits for the background stream reader to hit end-of-stream,
            // then tears down and exits — the stream-mode exit-on-EOF
            // contract.
            orchestrator.wait_for_stream_exit().await;
            orchestrator.shutdown().await;
        }
        TransportMode::Http => {
            shutdown_signal().await;
            orchestrator.shutdown().await;
        }
    }
}
