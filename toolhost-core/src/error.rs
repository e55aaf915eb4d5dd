//! Error taxonomy shared by the transport, dispatch and persistence layers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 error codes used across the core.
pub mod rpc_code {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_ENVELOPE: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const APPLICATION_ERROR: i32 = -32000;
}

/// The `error` member of a JSON-RPC response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(rpc_code::PARSE_ERROR, message)
    }

    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Self::new(rpc_code::INVALID_ENVELOPE, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(rpc_code::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(rpc_code::APPLICATION_ERROR, message)
    }

    /// A blocked tool call, prefixed per the `[BLOCKED]` contract.
    pub fn blocked(message: impl std::fmt::Display) -> Self {
        Self::new(rpc_code::APPLICATION_ERROR, format!("[BLOCKED] {message}"))
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// HTTP-facing error for routes that are not JSON-RPC (health, REST tool
/// calls, hooks, psychology sync). JSON-RPC routes always answer 200 with an
/// envelope-level error instead of using this type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Forbidden(String),
    PayloadTooLarge(String),
    Timeout(String),
    Unavailable(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(&self) -> (StatusCode, Value) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, serde_json::json!({ "error": msg })),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, serde_json::json!({ "error": msg }))
            }
            AppError::Timeout(msg) => (StatusCode::REQUEST_TIMEOUT, serde_json::json!({ "error": msg })),
            AppError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, serde_json::json!({ "error": msg }))
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({ "error": msg }))
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (status, body) = self.status_and_body();
        write!(f, "{status}: {body}")
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_message_carries_prefix() {
        let err = RpcError::blocked("guardian refused");
        assert_eq!(err.code, rpc_code::APPLICATION_ERROR);
        assert!(err.message.starts_with("[BLOCKED]"));
    }

    #[test]
    fn method_not_found_names_method() {
        let err = RpcError::method_not_found("unknown/method");
        assert_eq!(err.code, rpc_code::METHOD_NOT_FOUND);
        assert!(err.message.contains("unknown/method"));
    }
}
