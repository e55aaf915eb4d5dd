//! The JSON-RPC Handler: validates envelopes and routes method names
//! against a fixed dispatch table.

use std::sync::Arc;

use serde_json::Value;

use toolhost_core::error::RpcError;
use toolhost_core::types::now_rfc3339;
use toolhost_dispatch::Dispatcher;
use toolhost_registry::ToolRegistry;

use crate::envelope::{JsonRpcRequest, JsonRpcResponse};
use crate::truncate::truncate_if_oversized;

/// Protocol version string the `initialize` method reports. Fixed by
/// contract, not negotiated.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// The server-stop hook `shutdown` invokes. Implemented by the orchestrator;
/// [`NoopControl`] stands in for tests and standalone handler use.
pub trait ServerControl: Send + Sync {
    fn request_stop(&self);
}

pub struct NoopControl;

impl ServerControl for NoopControl {
    fn request_stop(&self) {}
}

/// A [`ServerControl`] the orchestrator can await: `shutdown` (from either
/// transport) flips the flag and wakes anyone parked on [`Self::notified`].
pub struct ShutdownSignal {
    requested: std::sync::atomic::AtomicBool,
    notify: tokio::sync::Notify,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self { requested: std::sync::atomic::AtomicBool::new(false), notify: tokio::sync::Notify::new() }
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub async fn notified(&self) {
        if self.is_requested() {
            return;
        }
        self.notify.notified().await;
    }
}

impl ServerControl for ShutdownSignal {
    fn request_stop(&self) {
        self.requested.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}


pub struct ServerIdentity {
    pub name: String,
    pub version: String,
}

pub struct JsonRpcHandler {
    registry: Arc<ToolRegistry>,
    dispatcher: Arc<Dispatcher>,
    identity: ServerIdentity,
    control: Arc<dyn ServerControl>,
}

fn descriptor_json(descriptor: &toolhost_registry::ToolDescriptor) -> Value {
    serde_json::json!({
        "name": descriptor.name,
        "description": descriptor.description,
        "inputSchema": descriptor.input_schema,
    })
}

impl JsonRpcHandler {
    pub fn new(
        registry: Arc<ToolRegistry>,
        dispatcher: Arc<Dispatcher>,
        identity: ServerIdentity,
        control: Arc<dyn ServerControl>,
    ) -> Self {
        Self { registry, dispatcher, identity, control }
    }

    /// Routes a single parsed request. Returns `None` for notifications —
    /// callers must not emit an envelope in that case.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.is_notification();
        let id = request.id.clone();

        let outcome = self.dispatch_method(&request.method, request.params).await;

        if is_notification {
            return None;
        }

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, truncate_if_oversized(result)),
            Err(err) => JsonRpcResponse::failure(id, err),
        })
    }

    /// Routes a parse/validation failure straight to an error envelope
    /// (there is no parsed request to check for notification status).
    pub fn handle_parse_error(&self, id: Option<Value>, error: RpcError) -> JsonRpcResponse {
        JsonRpcResponse::failure(id, error)
    }

    async fn dispatch_method(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": self.identity.name, "version": self.identity.version },
                "capabilities": { "tools": {}, "resources": {}, "prompts": {} },
            })),
            "tools/list" => {
                let tools: Vec<Value> = self.registry.list().iter().map(|d| descriptor_json(d)).collect();
                Ok(serde_json::json!({ "tools": tools }))
            }
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::application("tools/call requires a string 'name'"))?;
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Object(Default::default()));
                self.dispatcher.dispatch(name, arguments).await
            }
            "resources/list" => Ok(serde_json::json!({ "resources": [] })),
            "prompts/list" => Ok(serde_json::json!({ "prompts": [] })),
            "ping" => Ok(serde_json::json!({ "pong": true, "timestamp": now_rfc3339() })),
            "shutdown" => {
                self.control.request_stop();
                Ok(serde_json::json!({ "success": true }))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use toolhost_core::config::Config;
    use toolhost_core::services::ServiceBag;
    use toolhost_dispatch::NoopCollective;
    use toolhost_events::EventBus;
    use toolhost_persistence::PersistenceManager;
    use toolhost_registry::{ToolDescriptor, ToolFactory, ToolOutput};
    use toolhost_session::SessionManager;

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
                Arc::new(|args: Value| async move { Ok(args) }),
            )))
        }
    }

    async fn handler() -> JsonRpcHandler {
        let bus = EventBus::new();
        let persistence = PersistenceManager::initialize(&Config::in_memory_for_tests()).await;
        let sessions = Arc::new(SessionManager::new(&persistence, bus.clone()));
        sessions.start_session("u", None, None).await;
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoFactory));
        registry.create_all(&ServiceBag::new());
        let registry = Arc::new(registry);
        let dispatcher =
            Arc::new(Dispatcher::new(Arc::clone(&registry), sessions, bus, Arc::new(NoopCollective)));
        JsonRpcHandler::new(
            registry,
            dispatcher,
            ServerIdentity { name: "toolhost".into(), version: "0.1.0".into() },
            Arc::new(NoopControl),
        )
    }

    #[tokio::test]
    async fn initialize_reports_the_fixed_protocol_version() {
        let handler = handler().await;
        let request = crate::envelope::parse_request(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#).unwrap();
        let response = handler.handle(request).await.unwrap();
        assert_eq!(response.result.unwrap()["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let handler = handler().await;
        let request = crate::envelope::parse_request(r#"{"jsonrpc":"2.0","id":2,"method":"bogus"}"#).unwrap();
        let response = handler.handle(request).await.unwrap();
        assert_eq!(response.error.unwrap().code, toolhost_core::error::rpc_code::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let handler = handler().await;
        let request = crate::envelope::parse_request(r#"{"jsonrpc":"2.0","method":"initialized"}"#).unwrap();
        assert!(handler.handle(request).await.is_none());
    }

    #[tokio::test]
    async fn tools_call_dispatches_through_the_registered_handler() {
        let handler = handler().await;
        let request = crate::envelope::parse_request(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"x":1}}}"#,
        )
        .unwrap();
        let response = handler.handle(request).await.unwrap();
        assert!(response.error.is_none());
        assert!(response.result.unwrap()["content"][0]["text"].as_str().unwrap().contains('1'));
    }

    #[tokio::test]
    async fn shutdown_invokes_the_control_hook() {
        struct FlagControl(Arc<AtomicBool>);
        impl ServerControl for FlagControl {
            fn request_stop(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let flag = Arc::new(AtomicBool::new(false));

        let bus = EventBus::new();
        let persistence = PersistenceManager::initialize(&Config::in_memory_for_tests()).await;
        let sessions = Arc::new(SessionManager::new(&persistence, bus.clone()));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoFactory));
        registry.create_all(&ServiceBag::new());
        let registry = Arc::new(registry);
        let dispatcher =
            Arc::new(Dispatcher::new(Arc::clone(&registry), sessions, bus, Arc::new(NoopCollective)));
        let handler = JsonRpcHandler::new(
            registry,
            dispatcher,
            ServerIdentity { name: "toolhost".into(), version: "0.1.0".into() },
            Arc::new(FlagControl(Arc::clone(&flag))),
        );

        let request = crate::envelope::parse_request(r#"{"jsonrpc":"2.0","id":4,"method":"shutdown"}"#).unwrap();
        handler.handle(request).await.unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }
}
