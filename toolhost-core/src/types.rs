//! Small value types shared across the dispatch, event and transport layers.

use serde::{Deserialize, Serialize};

/// The hook lifecycle points the collective can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookType {
    PreToolUse,
    PostToolUse,
    SessionStarted,
    SessionEnded,
    Notification,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::PreToolUse => "pre-tool",
            HookType::PostToolUse => "post-tool",
            HookType::SessionStarted => "session-started",
            HookType::SessionEnded => "session-ended",
            HookType::Notification => "notification",
        }
    }
}

/// Tri-state outcome of a hook invocation, per the design note: blocking is
/// a tagged return rather than a mutated flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HookOutcome {
    Allow,
    Warn { message: String },
    Block { blocked_by: String, message: String },
}

impl HookOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, HookOutcome::Block { .. })
    }
}

/// Payload describing a pre/post tool hook, handed to the collective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookPayload {
    pub tool: String,
    pub tool_use_id: String,
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Mints a tool-use identifier: millisecond timestamp plus a random suffix,
/// unique enough to correlate pre/post hooks and streamed events without a
/// central counter.
pub fn mint_tool_use_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("tu_{millis}_{}", &suffix[..8])
}

/// Current wall-clock timestamp in RFC 3339, used on events and envelopes.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_use_ids_are_unique() {
        let a = mint_tool_use_id();
        let b = mint_tool_use_id();
        assert_ne!(a, b);
        assert!(a.starts_with("tu_"));
    }

    #[test]
    fn block_outcome_reports_blocked() {
        let outcome = HookOutcome::Block { blocked_by: "guardian".into(), message: "nope".into() };
        assert!(outcome.is_blocked());
        let allow = HookOutcome::Allow;
        assert!(!allow.is_blocked());
    }
}
