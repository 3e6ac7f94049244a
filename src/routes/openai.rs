use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::AppState;
use crate::constants::{REQUEST_TIMEOUT, THINKING_MIN_MAX_TOKENS};
use crate::error::ProxyError;
use crate::transforms::{fix_request_history, repair_response_message, stream_repair_reasoning};

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Response {
    if let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) {
        fix_request_history(messages);
        debug!("repaired {} history messages", messages.len());
    }

    if thinking_requested(&body) {
        apply_thinking_adjustments(&mut body);
    }

    let stream = body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut req = state
        .http_client
        .post(state.config.chat_completions_url())
        .header("content-type", "application/json")
        .json(&body);
    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        req = req.header("authorization", auth.as_bytes());
    }
    if !stream {
        req = req.timeout(REQUEST_TIMEOUT);
    }

    let response: reqwest::Response = match req.send().await {
        Ok(r) => r,
        Err(e) => return ProxyError::from(e).to_openai_response(),
    };

    if !response.status().is_success() {
        return super::relay_upstream(response).await;
    }

    if stream {
        super::sse_response(stream_repair_reasoning(response.bytes_stream()))
    } else {
        let mut data = match response.json::<Value>().await {
            Ok(d) => d,
            Err(e) => return ProxyError::ParseError(e.to_string()).to_openai_response(),
        };

        if let Some(choices) = data.get_mut("choices").and_then(Value::as_array_mut) {
            for choice in choices {
                if let Some(message) = choice.get_mut("message") {
                    repair_response_message(message);
                }
            }
        }

        Json(data).into_response()
    }
}

pub async fn list_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let mut req = state
        .http_client
        .get(state.config.models_url())
        .timeout(REQUEST_TIMEOUT);
    if let Some(auth) = headers.get(header::AUTHORIZATION) {
        req = req.header("authorization", auth.as_bytes());
    }

    match req.send().await {
        Ok(response) => super::relay_upstream(response).await,
        Err(e) => ProxyError::from(e).to_openai_response(),
    }
}

/// Thinking is requested via a top-level `thinking` knob or the SDK's
/// `extra_body.thinking` escape hatch.
fn thinking_requested(body: &Value) -> bool {
    let truthy = |v: Option<&Value>| {
        v.is_some_and(|v| match v {
            Value::Null => false,
            Value::Bool(b) => *b,
            _ => true,
        })
    };

    truthy(body.get("thinking")) || truthy(body.get("extra_body").and_then(|e| e.get("thinking")))
}

/// Thinking responses are long. Undersized token budgets get raised and the
/// response is streamed so the round trip cannot hit the buffered timeout;
/// the model also requires temperature 1.0 in this mode.
fn apply_thinking_adjustments(body: &mut Value) {
    let Some(obj) = body.as_object_mut() else {
        return;
    };

    let max_tokens = obj.get("max_tokens").and_then(Value::as_u64).unwrap_or(0);
    if max_tokens < THINKING_MIN_MAX_TOKENS {
        obj.insert("max_tokens".to_string(), json!(THINKING_MIN_MAX_TOKENS));
    }

    obj.insert("temperature".to_string(), json!(1.0));

    if !obj.get("stream").and_then(Value::as_bool).unwrap_or(false) {
        debug!("auto-enabling stream for thinking mode");
        obj.insert("stream".to_string(), json!(true));
    }
}
