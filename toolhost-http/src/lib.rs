//! The HTTP Adapter: axum router, SSE broadcast, active-request tracking
//! and graceful shutdown for the HTTP transport mode.

pub mod active_requests;
pub mod metrics;
pub mod routes;
pub mod sse;
pub mod state;

use std::time::Duration;

pub use routes::build_router;
pub use state::AppState;

/// Stops accepting new connections is the caller's job (drop the listener);
/// this just drains what's already in flight and tells SSE clients to go
/// away by dropping the broadcaster's last reference.
pub async fn graceful_shutdown(state: &AppState) {
    state.shutdown.request_stop();
    let remaining = state.active_requests.wait_for_drain(Duration::from_secs(10)).await;
    if remaining > 0 {
        tracing::warn!(remaining, "shutting down with requests still outstanding");
    }
}

pub mod prelude {
    pub use crate::active_requests::{ActiveRequestGuard, ActiveRequests};
    pub use crate::metrics::MetricsProvider;
    pub use crate::routes::build_router;
    pub use crate::sse::SseBroadcaster;
    pub use crate::state::AppState;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use toolhost_core::config::Config;
    use toolhost_core::health::HealthRegistry;
    use toolhost_core::services::ServiceBag;
    use toolhost_dispatch::{Dispatcher, NoopCollective};
    use toolhost_events::EventBus;
    use toolhost_persistence::PersistenceManager;
    use toolhost_registry::{ToolDescriptor, ToolFactory, ToolOutput, ToolRegistry};
    use toolhost_rpc::handler::{JsonRpcHandler, ServerIdentity, ShutdownSignal};
    use toolhost_session::SessionManager;

    use super::*;

    struct EchoFactory;
    impl ToolFactory for EchoFactory {
        fn name(&self) -> &str {
            "echo"
        }
        fn create(&self, _services: &ServiceBag) -> Option<ToolOutput> {
            Some(ToolOutput::One(ToolDescriptor::new(
                "echo",
                "echoes input",
                serde_json::json!({}),
                Arc::new(|args: serde_json::Value| async move { Ok(args) }),
            )))
        }
    }

    async fn test_state() -> AppState {
        let bus = EventBus::new();
        let config = Arc::new(Config::in_memory_for_tests());
        let persistence_owned = PersistenceManager::initialize(&config).await;
        let sessions = Arc::new(SessionManager::new(&persistence_owned, bus.clone()));
        let persistence = Arc::new(persistence_owned);
        sessions.start_session("u", None, None).await;
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoFactory));
        registry.create_all(&ServiceBag::new());
        let registry = Arc::new(registry);
        let collective: Arc<dyn toolhost_dispatch::Collective> = Arc::new(NoopCollective);
        let dispatcher =
            Arc::new(Dispatcher::new(Arc::clone(&registry), sessions, bus, Arc::clone(&collective)));
        let rpc = Arc::new(JsonRpcHandler::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            ServerIdentity { name: "toolhost".into(), version: "0.1.0".into() },
            Arc::new(ShutdownSignal::new()),
        ));
        AppState {
            rpc,
            registry,
            dispatcher,
            persistence,
            health: Arc::new(HealthRegistry::new()),
            sse: Arc::new(sse::SseBroadcaster::new(128)),
            collective,
            metrics: None,
            active_requests: active_requests::ActiveRequests::new(),
            shutdown: Arc::new(ShutdownSignal::new()),
            config,
        }
    }

    #[tokio::test]
    async fn health_route_reports_ok_with_no_indicators() {
        let router = build_router(test_state().await);
        let response =
            router.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_without_a_provider_is_service_unavailable() {
        let router = build_router(test_state().await);
        let response =
            router.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn preflight_options_is_no_content() {
        let router = build_router(test_state().await);
        let response = router
            .oneshot(Request::builder().method("OPTIONS").uri("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let router = build_router(test_state().await);
        let response =
            router.oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mcp_route_dispatches_a_jsonrpc_request() {
        let router = build_router(test_state().await);
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["result"]["pong"], true);
    }

    #[tokio::test]
    async fn oversized_body_on_mcp_route_is_413() {
        let mut state = test_state().await;
        state.config = Arc::new({
            let mut c = Config::in_memory_for_tests();
            c.max_request_body_bytes = 10;
            c
        });
        let router = build_router(state);
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn rest_tool_call_invokes_the_dispatcher() {
        let router = build_router(test_state().await);
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tools/echo")
                    .body(Body::from(r#"{"x": 7}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rest_tool_call_for_unknown_tool_is_500_with_not_found_message() {
        let router = build_router(test_state().await);
        let response = router
            .oneshot(Request::builder().method("POST").uri("/api/tools/nope").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn psychology_round_trips_through_sync_and_load() {
        let router = build_router(test_state().await);
        let sync = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/psychology/sync")
                    .body(Body::from(r#"{"userId":"u1","mood":"ok"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(sync.status(), StatusCode::OK);

        let load = router
            .oneshot(Request::builder().uri("/psychology/load?userId=u1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(load.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn psychology_load_for_unknown_user_is_404() {
        let router = build_router(test_state().await);
        let response = router
            .oneshot(Request::builder().uri("/psychology/load?userId=ghost").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
