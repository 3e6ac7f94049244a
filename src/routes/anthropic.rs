use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::AppState;
use crate::config::UpstreamFormat;
use crate::constants::{ANTHROPIC_VERSION, DEFAULT_MODEL, REQUEST_TIMEOUT};
use crate::error::ProxyError;
use crate::transforms::{
    fix_anthropic_request_history, stream_openai_to_anthropic, stream_passthrough,
    to_anthropic_response, to_openai_request,
};

pub async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    if let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) {
        fix_anthropic_request_history(messages);
        debug!("repaired {} history messages", messages.len());
    }

    // Credential forwarding only: the proxy never validates keys itself
    let api_key = extract_api_key(&headers).unwrap_or_default();

    let stream = body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    match state.config.upstream_format {
        UpstreamFormat::Anthropic => {
            forward_native(&state, &body, &api_key, stream).await
        }
        UpstreamFormat::OpenAI => {
            forward_converted(&state, &body, &api_key, stream).await
        }
    }
}

/// Direct passthrough to an Anthropic-format upstream. Responses are relayed
/// verbatim; streams byte-for-byte.
async fn forward_native(
    state: &AppState,
    body: &Value,
    api_key: &str,
    stream: bool,
) -> Response {
    let mut req = state
        .http_client
        .post(state.config.messages_url())
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("content-type", "application/json")
        .json(body);
    if !stream {
        req = req.timeout(REQUEST_TIMEOUT);
    }

    let response: reqwest::Response = match req.send().await {
        Ok(r) => r,
        Err(e) => return ProxyError::from(e).to_anthropic_response(),
    };

    if !response.status().is_success() {
        return super::relay_upstream(response).await;
    }

    if stream {
        super::sse_response(stream_passthrough(response.bytes_stream()))
    } else {
        super::relay_upstream(response).await
    }
}

/// Full protocol conversion for an upstream that only speaks the OpenAI
/// format: request, response, and stream events are all translated.
async fn forward_converted(
    state: &AppState,
    body: &Value,
    api_key: &str,
    stream: bool,
) -> Response {
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_MODEL)
        .to_string();
    let openai_request = to_openai_request(body);

    let mut req = state
        .http_client
        .post(state.config.chat_completions_url())
        .header("authorization", format!("Bearer {api_key}"))
        .header("content-type", "application/json")
        .json(&openai_request);
    if !stream {
        req = req.timeout(REQUEST_TIMEOUT);
    }

    let response: reqwest::Response = match req.send().await {
        Ok(r) => r,
        Err(e) => return ProxyError::from(e).to_anthropic_response(),
    };

    if !response.status().is_success() {
        return super::relay_upstream(response).await;
    }

    if stream {
        super::sse_response(stream_openai_to_anthropic(response.bytes_stream()))
    } else {
        let data = match response.json::<Value>().await {
            Ok(d) => d,
            Err(e) => return ProxyError::ParseError(e.to_string()).to_anthropic_response(),
        };

        Json(to_anthropic_response(&data, &model)).into_response()
    }
}

/// Credential from `x-api-key`, falling back to a `Bearer`-prefixed
/// Authorization header.
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}
