//! Reasoning-content repair.
//!
//! The upstream thinking model drops the `reasoning_content` field on
//! assistant turns that carry tool calls, and then rejects conversation
//! histories that replay those turns without it. The repairs here either
//! recover the reasoning from an inline `<thinking>` span or substitute a
//! fixed placeholder so the history satisfies the upstream schema again.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

use crate::constants::REASONING_PLACEHOLDER;

static THINKING_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<thinking>(.*?)</thinking>").expect("thinking span pattern is valid")
});

/// Repair an OpenAI-format message history in place.
///
/// Every assistant message with tool calls ends up with a non-null
/// `reasoning_content`: recovered from a `<thinking>` span in the content
/// when one exists, the placeholder sentinel otherwise. An existing
/// `reasoning_content` key holding JSON null is normalized to an empty
/// string.
pub fn fix_request_history(messages: &mut [Value]) {
    for msg in messages.iter_mut() {
        if msg.get("role").and_then(Value::as_str) != Some("assistant") {
            continue;
        }

        let has_tool_calls = msg
            .get("tool_calls")
            .and_then(Value::as_array)
            .is_some_and(|calls| !calls.is_empty());
        let has_reasoning = msg.get("reasoning_content").is_some();

        if has_tool_calls && !has_reasoning {
            let content = msg
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let Some(obj) = msg.as_object_mut() else {
                continue;
            };

            match extract_thinking_span(&content) {
                Some((reasoning, remainder)) => {
                    obj.insert("reasoning_content".to_string(), json!(reasoning));
                    obj.insert("content".to_string(), json!(remainder));
                }
                None => {
                    obj.insert("reasoning_content".to_string(), json!(REASONING_PLACEHOLDER));
                }
            }
        }

        // The upstream rejects an explicit null; an empty string is accepted.
        if let Some(obj) = msg.as_object_mut()
            && obj.get("reasoning_content").is_some_and(Value::is_null)
        {
            obj.insert("reasoning_content".to_string(), json!(""));
        }
    }
}

/// Repair an Anthropic-format message history in place.
///
/// Assistant messages whose content array carries a `tool_use` block but no
/// `thinking` block get a placeholder thinking block inserted at the front.
/// Messages that already contain any thinking block are left untouched.
pub fn fix_anthropic_request_history(messages: &mut [Value]) {
    for msg in messages.iter_mut() {
        if msg.get("role").and_then(Value::as_str) != Some("assistant") {
            continue;
        }

        let Some(content) = msg.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };

        let has_thinking = content
            .iter()
            .any(|block| block.get("type").and_then(Value::as_str) == Some("thinking"));
        let has_tool_use = content
            .iter()
            .any(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"));

        if has_tool_use && !has_thinking {
            content.insert(
                0,
                json!({
                    "type": "thinking",
                    "thinking": REASONING_PLACEHOLDER
                }),
            );
        }
    }
}

/// Complete a freshly generated assistant message.
///
/// Unlike history repair this never fabricates a placeholder: when no
/// `<thinking>` span can be recovered the field is set to JSON null,
/// marking the reasoning as genuinely absent.
pub fn repair_response_message(message: &mut Value) {
    if message.get("role").and_then(Value::as_str) != Some("assistant")
        || message.get("reasoning_content").is_some()
    {
        return;
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let Some(obj) = message.as_object_mut() else {
        return;
    };

    match extract_thinking_span(&content) {
        Some((reasoning, remainder)) => {
            obj.insert("reasoning_content".to_string(), json!(reasoning));
            obj.insert("content".to_string(), json!(remainder));
        }
        None => {
            obj.insert("reasoning_content".to_string(), Value::Null);
        }
    }
}

/// Tag a streamed chunk's deltas with an explicit null `reasoning_content`.
///
/// Advisory only: a delta that carries `content` or `tool_calls` and is an
/// assistant delta (declared role, or implied by non-empty content) gets the
/// field set to null when missing. No span extraction happens at this
/// granularity; that is the relay's job.
pub fn repair_stream_delta(chunk: &mut Value) {
    let Some(choices) = chunk.get_mut("choices").and_then(Value::as_array_mut) else {
        return;
    };

    for choice in choices {
        let Some(delta) = choice.get_mut("delta").and_then(Value::as_object_mut) else {
            continue;
        };

        if !delta.contains_key("content") && !delta.contains_key("tool_calls") {
            continue;
        }
        if delta.contains_key("reasoning_content") {
            continue;
        }

        let is_assistant = delta.get("role").and_then(Value::as_str) == Some("assistant")
            || delta
                .get("content")
                .and_then(Value::as_str)
                .is_some_and(|c| !c.is_empty());

        if is_assistant {
            delta.insert("reasoning_content".to_string(), Value::Null);
        }
    }
}

/// First non-greedy `<thinking>…</thinking>` match: returns the trimmed
/// inner text and the content with every tagged span stripped and trimmed.
fn extract_thinking_span(content: &str) -> Option<(String, String)> {
    let captures = THINKING_SPAN.captures(content)?;
    let reasoning = captures.get(1).map_or("", |m| m.as_str()).trim().to_string();
    let remainder = THINKING_SPAN.replace_all(content, "").trim().to_string();
    Some((reasoning, remainder))
}
