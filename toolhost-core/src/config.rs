//! Environment-driven configuration.
//!
//! Resolution order (lowest to highest priority): `.env` file in the working
//! directory, then process environment variables. `.env` never overwrites an
//! already-set environment variable.

use std::time::Duration;

/// Selects which transport the orchestrator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stream,
    Http,
}

impl TransportMode {
    fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "http" => TransportMode::Http,
            _ => TransportMode::Stream,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport_mode: TransportMode,
    pub http_port: u16,
    pub durable_url: Option<String>,
    pub cache_url: Option<String>,
    pub data_dir: Option<std::path::PathBuf>,
    pub peer_nodes: Vec<String>,
    pub anchoring_enabled: bool,
    pub anchoring_wallet_path: Option<String>,
    pub github_token: Option<String>,
    pub max_request_body_bytes: usize,
    pub max_response_bytes: usize,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub sse_keepalive: Duration,
    pub poj_batch_size: usize,
    pub poj_batch_interval: Duration,
}

impl Config {
    /// Load configuration from `.env` (if present) overlaid with the process
    /// environment. Never fails: missing variables fall back to documented
    /// defaults.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    fn from_env() -> Self {
        let transport_mode = std::env::var("TRANSPORT_MODE")
            .map(|v| TransportMode::from_str(&v))
            .unwrap_or(TransportMode::Stream);

        let http_port = std::env::var("HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let durable_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let cache_url = std::env::var("CACHE_URL").ok().filter(|s| !s.is_empty());
        let data_dir = std::env::var("DATA_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(std::path::PathBuf::from);

        let peer_nodes = std::env::var("PEER_NODES")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let anchoring_enabled = std::env::var("ANCHORING_ENABLED")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let anchoring_wallet_path = std::env::var("ANCHORING_WALLET_PATH").ok();
        let github_token = std::env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty());

        let max_request_body_bytes = std::env::var("MAX_BODY_SIZE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024 * 1024);
        let max_response_bytes = std::env::var("MAX_RESPONSE_SIZE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100 * 1024);
        let request_timeout = std::env::var("REQUEST_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        let shutdown_grace = std::env::var("SHUTDOWN_GRACE_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));
        let poj_batch_size = std::env::var("POJ_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50);
        let poj_batch_interval = std::env::var("POJ_BATCH_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Self {
            transport_mode,
            http_port,
            durable_url,
            cache_url,
            data_dir,
            peer_nodes,
            anchoring_enabled,
            anchoring_wallet_path,
            github_token,
            max_request_body_bytes,
            max_response_bytes,
            request_timeout,
            shutdown_grace,
            sse_keepalive: Duration::from_secs(30),
            poj_batch_size,
            poj_batch_interval,
        }
    }

    /// A config with every optional backend disabled, for tests.
    pub fn in_memory_for_tests() -> Self {
        Self {
            transport_mode: TransportMode::Stream,
            http_port: 0,
            durable_url: None,
            cache_url: None,
            data_dir: None,
            peer_nodes: Vec::new(),
            anchoring_enabled: false,
            anchoring_wallet_path: None,
            github_token: None,
            max_request_body_bytes: 1024 * 1024,
            max_response_bytes: 100 * 1024,
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
            sse_keepalive: Duration::from_secs(30),
            poj_batch_size: 50,
            poj_batch_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_to_stream_transport() {
        std::env::remove_var("TRANSPORT_MODE");
        let config = Config::from_env();
        assert_eq!(config.transport_mode, TransportMode::Stream);
        assert_eq!(config.http_port, 3000);
    }

    #[test]
    #[serial]
    fn parses_peer_node_list() {
        std::env::set_var("PEER_NODES", "a.example,  b.example ,");
        let config = Config::from_env();
        std::env::remove_var("PEER_NODES");
        assert_eq!(config.peer_nodes, vec!["a.example", "b.example"]);
    }

    #[test]
    #[serial]
    fn reads_store_urls_and_anchoring_flag_by_documented_name() {
        std::env::set_var("DATABASE_URL", "postgres://example");
        std::env::set_var("CACHE_URL", "redis://example");
        std::env::set_var("ANCHORING_ENABLED", "true");
        let config = Config::from_env();
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("CACHE_URL");
        std::env::remove_var("ANCHORING_ENABLED");
        assert_eq!(config.durable_url.as_deref(), Some("postgres://example"));
        assert_eq!(config.cache_url.as_deref(), Some("redis://example"));
        assert!(config.anchoring_enabled);
    }

    #[test]
    #[serial]
    fn overrides_timing_and_size_limits_from_env() {
        std::env::set_var("SHUTDOWN_GRACE_SECONDS", "3");
        std::env::set_var("REQUEST_TIMEOUT_SECONDS", "7");
        std::env::set_var("MAX_BODY_SIZE_BYTES", "2048");
        std::env::set_var("MAX_RESPONSE_SIZE_BYTES", "4096");
        std::env::set_var("POJ_BATCH_SIZE", "9");
        std::env::set_var("POJ_BATCH_INTERVAL_SECONDS", "15");
        let config = Config::from_env();
        std::env::remove_var("SHUTDOWN_GRACE_SECONDS");
        std::env::remove_var("REQUEST_TIMEOUT_SECONDS");
        std::env::remove_var("MAX_BODY_SIZE_BYTES");
        std::env::remove_var("MAX_RESPONSE_SIZE_BYTES");
        std::env::remove_var("POJ_BATCH_SIZE");
        std::env::remove_var("POJ_BATCH_INTERVAL_SECONDS");
        assert_eq!(config.shutdown_grace, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.max_request_body_bytes, 2048);
        assert_eq!(config.max_response_bytes, 4096);
        assert_eq!(config.poj_batch_size, 9);
        assert_eq!(config.poj_batch_interval, Duration::from_secs(15));
    }
}
