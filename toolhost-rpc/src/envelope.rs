//! JSON-RPC 2.0 request/response envelopes.
//!
//! Grounded on the shape used across the `other_examples` MCP servers (e.g.
//! the semantic-scholar-mcp transport's `JsonRpcRequest`/`JsonRpcResponse`):
//! the id is carried as a raw `serde_json::Value` rather than a typed
//! string-or-number enum, since JSON-RPC permits either and callers never
//! need to do arithmetic on it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use toolhost_core::error::RpcError;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// A request carries no `id` (or names a method the protocol always
    /// treats as a notification) — per contract, it gets no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || matches!(self.method.as_str(), "initialized" | "notifications/initialized")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0", result: Some(result), error: None, id: id.unwrap_or(Value::Null) }
    }

    pub fn failure(id: Option<Value>, error: RpcError) -> Self {
        Self { jsonrpc: "2.0", result: None, error: Some(error), id: id.unwrap_or(Value::Null) }
    }
}

/// Parses and validates an envelope: JSON syntax errors become `-32700`;
/// a malformed request shape (missing `method`, wrong `jsonrpc` value)
/// becomes `-32600`.
pub fn parse_request(text: &str) -> Result<JsonRpcRequest, RpcError> {
    let value: Value = serde_json::from_str(text).map_err(|err| RpcError::parse_error(err.to_string()))?;
    let request: JsonRpcRequest =
        serde_json::from_value(value).map_err(|err| RpcError::invalid_envelope(err.to_string()))?;
    if request.jsonrpc != "2.0" {
        return Err(RpcError::invalid_envelope("jsonrpc must be \"2.0\""));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_produce_parse_error() {
        let err = parse_request("{not json").unwrap_err();
        assert_eq!(err.code, toolhost_core::error::rpc_code::PARSE_ERROR);
    }

    #[test]
    fn wrong_version_produces_invalid_envelope() {
        let err = parse_request(r#"{"jsonrpc":"1.0","method":"ping"}"#).unwrap_err();
        assert_eq!(err.code, toolhost_core::error::rpc_code::INVALID_ENVELOPE);
    }

    #[test]
    fn missing_method_produces_invalid_envelope() {
        let err = parse_request(r#"{"jsonrpc":"2.0"}"#).unwrap_err();
        assert_eq!(err.code, toolhost_core::error::rpc_code::INVALID_ENVELOPE);
    }

    #[test]
    fn notification_has_no_id() {
        let request = parse_request(r#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn initialized_is_always_a_notification_even_with_an_id() {
        let request = parse_request(r#"{"jsonrpc":"2.0","method":"initialized","id":1}"#).unwrap();
        assert!(request.is_notification());
    }
}
