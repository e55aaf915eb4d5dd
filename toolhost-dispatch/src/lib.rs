//! The Tool Dispatcher: the fixed nine-step pipeline every tool call runs
//! through — lookup, pre-hook, execute, post-hook, envelope.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use toolhost_core::error::RpcError;
use toolhost_core::types::{mint_tool_use_id, HookOutcome, HookPayload};
use toolhost_events::{EventBus, PublishOptions};
use toolhost_registry::ToolRegistry;
use toolhost_session::SessionManager;

/// Outcome of a pre-hook invocation: the tri-state [`HookOutcome`] plus how
/// many subscribers the collective notified, carried on the `tool_pre`
/// event for observability.
pub struct PreHookResult {
    pub outcome: HookOutcome,
    pub agents_notified: usize,
}

/// The collective a tool call is checked against before and after
/// execution. Implemented outside this crate (the "guardian"/agent layer);
/// [`NoopCollective`] stands in wherever nothing is wired up.
///
/// Unlike the teacher's compile-time `Interceptor<R, S>` (an around-pattern
/// trait resolved at the call site), the collective here is looked up once
/// at dispatcher construction and invoked by name at two fixed checkpoints —
/// closer to a runtime strategy object than a generic wrapper.
#[async_trait]
pub trait Collective: Send + Sync {
    async fn pre_tool_use(&self, payload: &HookPayload) -> PreHookResult;

    /// Fire-and-forget: the dispatcher does not await this before replying
    /// to the caller. Errors are the implementation's own problem to log.
    async fn post_tool_use(&self, payload: HookPayload);

    /// Ingress for externally-posted hook events (the HTTP Adapter's
    /// `/hooks/event` route) that don't originate from a dispatcher call.
    /// Default: acknowledge without acting.
    async fn receive_hook_event(&self, _hook_type: toolhost_core::types::HookType, _payload: Value) -> Value {
        serde_json::json!({ "received": true })
    }
}

/// A collective that allows every call and does nothing on completion —
/// the default when no external collective is configured.
pub struct NoopCollective;

#[async_trait]
impl Collective for NoopCollective {
    async fn pre_tool_use(&self, _payload: &HookPayload) -> PreHookResult {
        PreHookResult { outcome: HookOutcome::Allow, agents_notified: 0 }
    }

    async fn post_tool_use(&self, _payload: HookPayload) {}
}

/// Bound on how much of a tool's input/output is copied into the post-hook
/// payload and the `tool_post` event; the full result still goes to the
/// caller untruncated (that cap lives in the RPC layer's response framing).
const HOOK_PAYLOAD_PREVIEW_LEN: usize = 4000;

fn preview(value: &Value) -> Value {
    let rendered = value.to_string();
    if rendered.len() <= HOOK_PAYLOAD_PREVIEW_LEN {
        return value.clone();
    }
    Value::String(format!("{}…(truncated)", &rendered[..HOOK_PAYLOAD_PREVIEW_LEN]))
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionManager>,
    bus: EventBus,
    collective: Arc<dyn Collective>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        sessions: Arc<SessionManager>,
        bus: EventBus,
        collective: Arc<dyn Collective>,
    ) -> Self {
        Self { registry, sessions, bus, collective }
    }

    /// Runs the full pipeline for a single tool invocation, returning the
    /// MCP `content` envelope on success or an [`RpcError`] to surface on
    /// the JSON-RPC response.
    pub async fn dispatch(&self, tool_name: &str, args: Value) -> Result<Value, RpcError> {
        let descriptor = self
            .registry
            .get(tool_name)
            .ok_or_else(|| RpcError::application(format!("Tool not found: {tool_name}")))?;

        let tool_use_id = mint_tool_use_id();
        let pre_payload = HookPayload {
            tool: tool_name.to_string(),
            tool_use_id: tool_use_id.clone(),
            input: preview(&args),
            output: None,
            duration_ms: None,
            success: None,
        };

        let pre = self.collective.pre_tool_use(&pre_payload).await;
        if let HookOutcome::Block { blocked_by, message } = &pre.outcome {
            tracing::warn!(tool = tool_name, %blocked_by, "tool call blocked by collective");
            self.bus.publish(
                "tool_pre",
                serde_json::json!({
                    "tool": tool_name,
                    "toolUseId": tool_use_id,
                    "blockedBy": blocked_by,
                }),
                PublishOptions::default(),
            );
            return Err(RpcError::blocked(message));
        }
        if let HookOutcome::Warn { message } = &pre.outcome {
            tracing::warn!(tool = tool_name, %message, "pre-hook warned, proceeding");
        }

        self.bus.publish(
            "tool_pre",
            serde_json::json!({
                "tool": tool_name,
                "toolUseId": tool_use_id,
                "agentsNotified": pre.agents_notified,
                "timestamp": toolhost_core::types::now_rfc3339(),
            }),
            PublishOptions::default(),
        );

        let started = Instant::now();
        let outcome = descriptor.handler.call(args.clone()).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let success = outcome.is_ok();

        if success {
            if let Some(field) = &descriptor.counter_field {
                self.sessions.increment_counter(field).await;
            }
        } else {
            self.sessions.increment_counter("errors").await;
        }

        let output_for_hook = match &outcome {
            Ok(value) => Some(preview(value)),
            Err(err) => Some(Value::String(err.to_string())),
        };
        let post_payload = HookPayload {
            tool: tool_name.to_string(),
            tool_use_id: tool_use_id.clone(),
            input: preview(&args),
            output: output_for_hook,
            duration_ms: Some(duration_ms),
            success: Some(success),
        };

        self.bus.publish(
            "tool_post",
            serde_json::json!({
                "tool": tool_name,
                "toolUseId": tool_use_id,
                "durationMs": duration_ms,
                "success": success,
            }),
            PublishOptions::default(),
        );

        let collective = Arc::clone(&self.collective);
        tokio::spawn(async move {
            collective.post_tool_use(post_payload).await;
        });

        let result = outcome.map_err(|err| RpcError::application(err.to_string()))?;
        Ok(serde_json::json!({
            "content": [{ "type": "text", "text": result.to_string() }],
        }))
    }
}
