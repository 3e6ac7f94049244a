//! OpenAI-compatible API format conversion.
//!
//! Pure conversions between the Anthropic messages schema and the OpenAI
//! chat-completions schema, for the route where an Anthropic-format client
//! talks to an OpenAI-format upstream. All functions are total over
//! arbitrary JSON input and perform no I/O.

use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::constants::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

/// OpenAI chat request built from an Anthropic messages request.
///
/// Optional fields are serialized only when the source request carried them.
#[derive(Debug, Serialize)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

/// Flatten Anthropic messages into OpenAI shape.
///
/// Block-sequence content keeps only `text` blocks, joined with newlines;
/// string content and the role pass through unchanged.
pub fn to_openai_messages(messages: &[Value]) -> Vec<OpenAIMessage> {
    messages
        .iter()
        .map(|msg| {
            let role = msg
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("user")
                .to_string();

            let content = match msg.get("content") {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Array(blocks)) => blocks
                    .iter()
                    .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|block| block.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n"),
                _ => String::new(),
            };

            OpenAIMessage { role, content }
        })
        .collect()
}

/// Convert an Anthropic messages request to an OpenAI chat request.
pub fn to_openai_request(body: &Value) -> OpenAIChatRequest {
    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .map(|msgs| to_openai_messages(msgs))
        .unwrap_or_default();

    OpenAIChatRequest {
        model: body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MODEL)
            .to_string(),
        messages,
        max_tokens: body
            .get("max_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: body.get("temperature").and_then(Value::as_f64),
        top_p: body.get("top_p").and_then(Value::as_f64),
        stop: body.get("stop_sequences").cloned(),
        stream: body.get("stream").and_then(Value::as_bool),
    }
}

/// Convert a buffered OpenAI chat response to an Anthropic message envelope.
///
/// Reasoning becomes a leading `thinking` block, text a trailing `text`
/// block. Only `stop` and `length` finish reasons are mapped; anything else
/// leaves `stop_reason` null.
pub fn to_anthropic_response(response: &Value, model: &str) -> Value {
    let usage = response.get("usage");
    let mut envelope = json!({
        "id": generate_message_id(),
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [],
        "stop_reason": null,
        "stop_sequence": null,
        "usage": {
            "input_tokens": usage
                .and_then(|u| u.get("prompt_tokens"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
            "output_tokens": usage
                .and_then(|u| u.get("completion_tokens"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
        }
    });

    let Some(choice) = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    else {
        return envelope;
    };

    let message = choice.get("message");
    let mut content = Vec::new();

    if let Some(reasoning) = message
        .and_then(|m| m.get("reasoning_content"))
        .and_then(Value::as_str)
        && !reasoning.is_empty()
    {
        content.push(json!({"type": "thinking", "thinking": reasoning}));
    }

    if let Some(text) = message
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        && !text.is_empty()
    {
        content.push(json!({"type": "text", "text": text}));
    }

    envelope["content"] = Value::Array(content);

    match choice.get("finish_reason").and_then(Value::as_str) {
        Some("stop") => envelope["stop_reason"] = json!("end_turn"),
        Some("length") => envelope["stop_reason"] = json!("max_tokens"),
        _ => {}
    }

    envelope
}

/// Convert one OpenAI stream chunk to an Anthropic stream event.
///
/// Returns `None` for chunks carrying no representable change (no choices,
/// or a bare role announcement). Text content wins over reasoning within
/// the same chunk.
pub fn chunk_to_anthropic_event(chunk: &Value) -> Option<Value> {
    let choice = chunk
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())?;

    let delta = choice.get("delta");

    if let Some(text) = delta.and_then(|d| d.get("content")).and_then(Value::as_str)
        && !text.is_empty()
    {
        return Some(json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": text}
        }));
    }

    if let Some(reasoning) = delta
        .and_then(|d| d.get("reasoning_content"))
        .and_then(Value::as_str)
        && !reasoning.is_empty()
    {
        return Some(json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "thinking_delta", "thinking": reasoning}
        }));
    }

    if choice
        .get("finish_reason")
        .is_some_and(|reason| !reason.is_null())
    {
        return Some(json!({"type": "message_stop"}));
    }

    None
}

fn generate_message_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("msg_{}", &hex[..24])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattens_block_content() {
        let messages = vec![json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "source": {}},
                {"type": "text", "text": "second"}
            ]
        })];
        let converted = to_openai_messages(&messages);

        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[0].content, "first\nsecond");
    }

    #[test]
    fn test_string_content_passes_through() {
        let messages = vec![json!({"role": "assistant", "content": "hi"})];
        let converted = to_openai_messages(&messages);

        assert_eq!(converted[0].role, "assistant");
        assert_eq!(converted[0].content, "hi");
    }

    #[test]
    fn test_request_defaults() {
        let body = json!({"messages": []});
        let request = to_openai_request(&body);

        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(request.temperature.is_none());
        assert!(request.stream.is_none());
    }

    #[test]
    fn test_request_optional_fields_only_when_present() {
        let body = json!({
            "model": "kimi-k2.5",
            "messages": [{"role": "user", "content": "q"}],
            "max_tokens": 1024,
            "temperature": 0.5,
            "stop_sequences": ["END"],
            "stream": true
        });
        let serialized = serde_json::to_value(to_openai_request(&body)).unwrap();

        assert_eq!(serialized["max_tokens"], 1024);
        assert_eq!(serialized["temperature"], 0.5);
        assert_eq!(serialized["stop"], json!(["END"]));
        assert_eq!(serialized["stream"], true);
        assert!(serialized.get("top_p").is_none());
    }

    #[test]
    fn test_response_conversion_with_reasoning_and_text() {
        let response = json!({
            "usage": {"prompt_tokens": 10, "completion_tokens": 20},
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "answer",
                    "reasoning_content": "because"
                },
                "finish_reason": "stop"
            }]
        });
        let converted = to_anthropic_response(&response, "kimi-k2.5");

        assert!(converted["id"].as_str().unwrap().starts_with("msg_"));
        assert_eq!(converted["model"], "kimi-k2.5");
        assert_eq!(converted["usage"]["input_tokens"], 10);
        assert_eq!(converted["usage"]["output_tokens"], 20);
        let content = converted["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "thinking");
        assert_eq!(content[0]["thinking"], "because");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "answer");
    }

    #[test]
    fn test_response_ids_are_unique() {
        let response = json!({"choices": []});
        let a = to_anthropic_response(&response, "m");
        let b = to_anthropic_response(&response, "m");

        assert_ne!(a["id"], b["id"]);
    }

    #[test]
    fn test_finish_reason_mapping() {
        for (finish, stop) in [("stop", json!("end_turn")), ("length", json!("max_tokens"))] {
            let response = json!({
                "choices": [{"message": {"content": "x"}, "finish_reason": finish}]
            });
            let converted = to_anthropic_response(&response, "m");
            assert_eq!(converted["stop_reason"], stop, "finish reason {finish}");
        }

        // Unmapped reasons stay null.
        for finish in ["tool_calls", "content_filter", "other"] {
            let response = json!({
                "choices": [{"message": {"content": "x"}, "finish_reason": finish}]
            });
            let converted = to_anthropic_response(&response, "m");
            assert!(converted["stop_reason"].is_null(), "finish reason {finish}");
        }
    }

    #[test]
    fn test_missing_usage_defaults_to_zero() {
        let converted = to_anthropic_response(&json!({}), "m");

        assert_eq!(converted["usage"]["input_tokens"], 0);
        assert_eq!(converted["usage"]["output_tokens"], 0);
        assert!(converted["stop_reason"].is_null());
    }

    #[test]
    fn test_chunk_without_choices_is_none() {
        assert!(chunk_to_anthropic_event(&json!({})).is_none());
        assert!(chunk_to_anthropic_event(&json!({"choices": []})).is_none());
    }

    #[test]
    fn test_chunk_text_delta() {
        let chunk = json!({"choices": [{"delta": {"content": "hi"}}]});
        let event = chunk_to_anthropic_event(&chunk).unwrap();

        assert_eq!(event["type"], "content_block_delta");
        assert_eq!(event["delta"]["type"], "text_delta");
        assert_eq!(event["delta"]["text"], "hi");
    }

    #[test]
    fn test_chunk_content_wins_over_reasoning() {
        let chunk = json!({
            "choices": [{"delta": {"content": "text", "reasoning_content": "thought"}}]
        });
        let event = chunk_to_anthropic_event(&chunk).unwrap();

        assert_eq!(event["delta"]["type"], "text_delta");
    }

    #[test]
    fn test_chunk_thinking_delta() {
        let chunk = json!({"choices": [{"delta": {"reasoning_content": "thought"}}]});
        let event = chunk_to_anthropic_event(&chunk).unwrap();

        assert_eq!(event["delta"]["type"], "thinking_delta");
        assert_eq!(event["delta"]["thinking"], "thought");
    }

    #[test]
    fn test_chunk_finish_reason_is_message_stop() {
        let chunk = json!({"choices": [{"delta": {}, "finish_reason": "stop"}]});
        let event = chunk_to_anthropic_event(&chunk).unwrap();

        assert_eq!(event["type"], "message_stop");
    }

    #[test]
    fn test_bare_role_announcement_is_none() {
        let chunk = json!({"choices": [{"delta": {"role": "assistant"}}]});
        assert!(chunk_to_anthropic_event(&chunk).is_none());
    }
}
