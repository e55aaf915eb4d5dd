//! Route handlers and router assembly.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use toolhost_core::error::RpcError;
use toolhost_core::types::HookType;
use toolhost_persistence::domain;
use toolhost_rpc::envelope::{parse_request, JsonRpcResponse};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(health).options(preflight))
        .route("/health", get(health).options(preflight))
        .route("/metrics", get(metrics_text).options(preflight))
        .route("/metrics/html", get(metrics_html).options(preflight))
        .route("/mcp", post(rpc_envelope).options(preflight))
        .route("/message", post(rpc_envelope).options(preflight))
        .route("/sse", get(sse_subscribe).options(preflight))
        .route("/api/tools", get(list_tools).options(preflight))
        .route("/api/tools/{name}", get(tool_info).post(call_tool).options(preflight))
        .route("/hooks/event", post(hook_event).options(preflight))
        .route("/psychology/sync", post(psychology_sync).options(preflight))
        .route("/psychology/load", get(psychology_load).options(preflight))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "not found"}))).into_response()
}

/// Axum's implicit per-route OPTIONS handler answers `200 OK`; CORS
/// preflight is specified to return `204 No Content`, so every route
/// registers this explicitly instead of relying on the default.
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.health.aggregate().await;
    let status = if snapshot.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(snapshot)).into_response()
}

async fn metrics_text(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(provider) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            provider.render_text(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"error": "metrics not configured"})))
            .into_response(),
    }
}

async fn metrics_html(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(provider) => {
            (StatusCode::OK, [("content-type", "text/html; charset=utf-8")], provider.render_html()).into_response()
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"error": "metrics not configured"})))
            .into_response(),
    }
}

/// Shared by `/mcp` and `/message`: body-size cap, request timeout, both
/// mapped to HTTP status plus a JSON-RPC `-32000` envelope in the body.
async fn rpc_envelope(State(state): State<AppState>, body: Bytes) -> Response {
    let _guard = state.active_requests.enter();

    if body.len() > state.config.max_request_body_bytes {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(JsonRpcResponse::failure(None, RpcError::application("request body exceeds size limit"))),
        )
            .into_response();
    }

    let text = match std::str::from_utf8(&body) {
        Ok(text) => text.to_string(),
        Err(_) => {
            return Json(JsonRpcResponse::failure(None, RpcError::parse_error("request body is not valid UTF-8")))
                .into_response();
        }
    };

    let handling = async {
        match parse_request(&text) {
            Ok(request) => state.rpc.handle(request).await,
            Err(err) => Some(state.rpc.handle_parse_error(None, err)),
        }
    };

    match tokio::time::timeout(state.config.request_timeout, handling).await {
        Ok(Some(response)) => Json(response).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => (
            StatusCode::REQUEST_TIMEOUT,
            Json(JsonRpcResponse::failure(None, RpcError::application("request timed out"))),
        )
            .into_response(),
    }
}

async fn sse_subscribe(
    State(state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    let endpoint = futures_util::stream::once(async { Ok(SseEvent::default().event("endpoint").data("/mcp")) });
    let updates = state.sse.subscribe();
    let combined = endpoint.chain(updates);
    Sse::new(combined).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("ping"))
}

async fn list_tools(State(state): State<AppState>) -> Response {
    let tools: Vec<Value> = state
        .registry
        .list()
        .iter()
        .map(|d| serde_json::json!({"name": d.name, "description": d.description, "domain": d.domain}))
        .collect();
    Json(serde_json::json!({"tools": tools})).into_response()
}

async fn tool_info(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.registry.get(&name) {
        Some(descriptor) => Json(serde_json::json!({
            "name": descriptor.name,
            "description": descriptor.description,
            "inputSchema": descriptor.input_schema,
            "domain": descriptor.domain,
        }))
        .into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "tool not found"}))).into_response(),
    }
}

async fn call_tool(State(state): State<AppState>, Path(name): Path<String>, body: Bytes) -> Response {
    let _guard = state.active_requests.enter();
    let args: Value = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(err) => {
                return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": err.to_string()})))
                    .into_response()
            }
        }
    };

    match state.dispatcher.dispatch(&name, args).await {
        Ok(result) => Json(result).into_response(),
        Err(err) if err.message.starts_with("[BLOCKED]") => {
            (StatusCode::FORBIDDEN, Json(serde_json::json!({"error": err.message}))).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.message})))
            .into_response(),
    }
}

async fn hook_event(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let hook_type_str = body.get("hookType").and_then(Value::as_str).unwrap_or("notification");
    let payload = body.get("payload").cloned().unwrap_or(Value::Null);

    let hook_type = match hook_type_str {
        "pre-tool" => HookType::PreToolUse,
        "post-tool" => HookType::PostToolUse,
        "session-started" => HookType::SessionStarted,
        "session-ended" => HookType::SessionEnded,
        _ => HookType::Notification,
    };

    let result = state.collective.receive_hook_event(hook_type, payload.clone()).await;

    state.sse.broadcast("hook:received", serde_json::json!({"hookType": hook_type_str, "payload": payload}).to_string());
    match hook_type {
        HookType::PreToolUse => {
            state.sse.broadcast("tool_pre", payload.to_string());
        }
        HookType::PostToolUse => {
            state.sse.broadcast("tool_post", payload.to_string());
        }
        _ => {}
    }

    Json(result).into_response()
}

#[derive(serde::Deserialize)]
struct PsychologyQuery {
    #[serde(rename = "userId")]
    user_id: String,
}

async fn psychology_sync(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(user_id) = body.get("userId").and_then(Value::as_str) else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "userId is required"}))).into_response();
    };
    let adapter = state.persistence.adapter(domain::PSYCHOLOGY);
    match adapter.save(user_id, body.clone()).await {
        Ok(()) => Json(serde_json::json!({"stored": true})).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": err.to_string()})))
            .into_response(),
    }
}

async fn psychology_load(State(state): State<AppState>, Query(query): Query<PsychologyQuery>) -> Response {
    let adapter = state.persistence.adapter(domain::PSYCHOLOGY);
    match adapter.get(&query.user_id).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "no snapshot for userId"}))).into_response(),
    }
}
