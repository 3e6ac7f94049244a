//! SSE stream transformations.
//!
//! This module provides:
//! - `stream_repair_reasoning`: repair `reasoning_content` in an OpenAI SSE
//!   stream, one event at a time
//! - `stream_openai_to_anthropic`: convert an OpenAI SSE stream to Anthropic
//!   SSE frames
//! - `stream_passthrough`: byte-identical relay for native Anthropic streams
//!
//! The transforming relays include keep-alive pings to prevent connection
//! timeouts during long thinking runs. Nothing here buffers a full response;
//! each corrected event is emitted as soon as its line is complete.

use async_stream::stream;
use bytes::Bytes;
use futures_util::Stream;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::interval;

use super::openai_compat::chunk_to_anthropic_event;
use super::reasoning::repair_stream_delta;

/// Keep-alive interval for SSE streams (prevents proxy/load balancer timeouts).
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// SSE keep-alive comment (ignored by clients but keeps connection alive).
const KEEP_ALIVE_COMMENT: &str = ": keep-alive\n\n";

const DONE_MARKER: &str = "[DONE]";

/// Repair `reasoning_content` in an OpenAI-format SSE stream.
///
/// Lines are processed independently as they complete:
/// - `data: [DONE]` is forwarded once and the stream ends
/// - JSON data lines get their assistant deltas repaired and are re-emitted
/// - lines that fail to parse are forwarded verbatim as their own event
/// - an upstream read error becomes a single in-band terminal error event
///
/// A `<thinking>` tag split across chunk boundaries is not reassembled; each
/// chunk is repaired on its own.
pub fn stream_repair_reasoning(
    body: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    stream! {
        use futures_util::StreamExt;

        let mut body = std::pin::pin!(body);
        let mut buffer = String::new();
        let mut keep_alive = interval(KEEP_ALIVE_INTERVAL);
        keep_alive.reset(); // Don't fire immediately

        'relay: loop {
            tokio::select! {
                biased; // Prefer data over keep-alive when both ready

                chunk_opt = body.next() => {
                    let Some(chunk_result) = chunk_opt else {
                        break 'relay; // Stream ended without a sentinel
                    };

                    let chunk = match chunk_result {
                        Ok(c) => c,
                        Err(e) => {
                            let event = json!({
                                "error": {"type": "upstream_error", "message": e.to_string()}
                            });
                            yield Ok(Bytes::from(format!("data: {event}\n\n")));
                            break 'relay;
                        }
                    };

                    let text = match std::str::from_utf8(&chunk) {
                        Ok(t) => t,
                        Err(_) => continue,
                    };

                    buffer.push_str(text);

                    while let Some(newline_pos) = buffer.find('\n') {
                        let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
                        buffer = buffer[newline_pos + 1..].to_string();

                        if line.is_empty() {
                            continue;
                        }

                        let Some(payload) = line.strip_prefix("data: ") else {
                            // Unrecognized line, forward framed as its own event
                            yield Ok(Bytes::from(format!("{line}\n\n")));
                            continue;
                        };
                        let payload = payload.trim();

                        if payload == DONE_MARKER {
                            yield Ok(Bytes::from(format!("data: {DONE_MARKER}\n\n")));
                            break 'relay;
                        }

                        match serde_json::from_str::<Value>(payload) {
                            Ok(mut event) => {
                                repair_chunk(&mut event);
                                yield Ok(Bytes::from(format!("data: {event}\n\n")));
                            }
                            Err(_) => {
                                // Never drop data on malformed JSON
                                yield Ok(Bytes::from(format!("{line}\n\n")));
                            }
                        }
                    }
                }

                _ = keep_alive.tick() => {
                    yield Ok(Bytes::from(KEEP_ALIVE_COMMENT));
                }
            }
        }
    }
}

/// Convert an OpenAI-format SSE stream to Anthropic SSE frames.
///
/// Each parsed chunk goes through `chunk_to_anthropic_event`; chunks with no
/// representable change are skipped. The stream ends after `message_stop` or
/// the upstream `[DONE]` sentinel, whichever comes first.
pub fn stream_openai_to_anthropic(
    body: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    stream! {
        use futures_util::StreamExt;

        let mut body = std::pin::pin!(body);
        let mut buffer = String::new();
        let mut keep_alive = interval(KEEP_ALIVE_INTERVAL);
        keep_alive.reset(); // Don't fire immediately

        'relay: loop {
            tokio::select! {
                biased;

                chunk_opt = body.next() => {
                    let Some(chunk_result) = chunk_opt else {
                        break 'relay;
                    };

                    let chunk = match chunk_result {
                        Ok(c) => c,
                        Err(e) => {
                            let event = json!({
                                "type": "error",
                                "error": {"type": "upstream_error", "message": e.to_string()}
                            });
                            yield Ok(Bytes::from(format!("event: error\ndata: {event}\n\n")));
                            break 'relay;
                        }
                    };

                    let text = match std::str::from_utf8(&chunk) {
                        Ok(t) => t,
                        Err(_) => continue,
                    };

                    buffer.push_str(text);

                    while let Some(newline_pos) = buffer.find('\n') {
                        let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
                        buffer = buffer[newline_pos + 1..].to_string();

                        if line.is_empty() {
                            continue;
                        }

                        let Some(payload) = line.strip_prefix("data: ") else {
                            yield Ok(Bytes::from(format!("{line}\n\n")));
                            continue;
                        };
                        let payload = payload.trim();

                        if payload == DONE_MARKER {
                            break 'relay;
                        }

                        let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
                            yield Ok(Bytes::from(format!("{line}\n\n")));
                            continue;
                        };

                        if let Some(event) = chunk_to_anthropic_event(&parsed) {
                            let event_type = event
                                .get("type")
                                .and_then(Value::as_str)
                                .unwrap_or("message_delta")
                                .to_string();
                            yield Ok(Bytes::from(format!("event: {event_type}\ndata: {event}\n\n")));

                            if event_type == "message_stop" {
                                break 'relay;
                            }
                        }
                    }
                }

                _ = keep_alive.tick() => {
                    yield Ok(Bytes::from(KEEP_ALIVE_COMMENT));
                }
            }
        }
    }
}

/// Relay a native Anthropic SSE stream byte-for-byte.
///
/// The reasoning defect is specific to the OpenAI-style schema, so nothing
/// is inspected or rewritten here. An upstream read error is reported as a
/// single in-band error frame (the status line is already committed).
pub fn stream_passthrough(
    body: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    stream! {
        use futures_util::StreamExt;

        let mut body = std::pin::pin!(body);

        while let Some(chunk_result) = body.next().await {
            match chunk_result {
                Ok(chunk) => yield Ok(chunk),
                Err(e) => {
                    let event = json!({
                        "type": "error",
                        "error": {"type": "upstream_error", "message": e.to_string()}
                    });
                    yield Ok(Bytes::from(format!("event: error\ndata: {event}\n\n")));
                    break;
                }
            }
        }
    }
}

/// Repair every assistant delta in one stream chunk.
///
/// Role-announcing deltas get the single-chunk `<thinking>` extraction from
/// the original proxy: a span opening at the start of content is split at
/// its closing tag, or swallows the rest of the chunk when unclosed.
/// Remaining content-only deltas are tagged by `repair_stream_delta`.
fn repair_chunk(chunk: &mut Value) {
    if let Some(choices) = chunk.get_mut("choices").and_then(Value::as_array_mut) {
        for choice in choices {
            let Some(delta) = choice.get_mut("delta").and_then(Value::as_object_mut) else {
                continue;
            };

            if delta.get("role").and_then(Value::as_str) != Some("assistant")
                || delta.contains_key("reasoning_content")
            {
                continue;
            }

            let content = delta
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if let Some(rest) = content.strip_prefix("<thinking>") {
                match rest.find("</thinking>") {
                    Some(end) => {
                        delta.insert("reasoning_content".to_string(), json!(&rest[..end]));
                        delta.insert(
                            "content".to_string(),
                            json!(&rest[end + "</thinking>".len()..]),
                        );
                    }
                    None => {
                        delta.insert("reasoning_content".to_string(), json!(rest));
                        delta.insert("content".to_string(), json!(""));
                    }
                }
            } else {
                delta.insert("reasoning_content".to_string(), Value::Null);
            }
        }
    }

    repair_stream_delta(chunk);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use futures_util::stream;

    fn fixture(
        parts: &[&str],
    ) -> stream::Iter<std::vec::IntoIter<Result<Bytes, reqwest::Error>>> {
        let owned: Vec<Result<Bytes, reqwest::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        stream::iter(owned)
    }

    async fn collect_frames(
        s: impl Stream<Item = Result<Bytes, std::io::Error>>,
    ) -> Vec<String> {
        s.map(|r| String::from_utf8(r.unwrap().to_vec()).unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_repairs_thinking_tag_and_forwards_done() {
        let upstream = fixture(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"<thinking>ab</thinking>cd\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let frames = collect_frames(stream_repair_reasoning(upstream)).await;

        assert_eq!(frames.len(), 2);
        let payload = frames[0]
            .strip_prefix("data: ")
            .unwrap()
            .trim_end();
        let chunk: Value = serde_json::from_str(payload).unwrap();
        let delta = &chunk["choices"][0]["delta"];
        assert_eq!(delta["reasoning_content"], "ab");
        assert_eq!(delta["content"], "cd");
        assert_eq!(frames[1], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_done_forwarded_exactly_once_then_ends() {
        let upstream = fixture(&[
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        ]);
        let frames = collect_frames(stream_repair_reasoning(upstream)).await;

        assert_eq!(frames, vec!["data: [DONE]\n\n".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_line_forwarded_verbatim() {
        let upstream = fixture(&[
            "data: {not json\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"ok\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let frames = collect_frames(stream_repair_reasoning(upstream)).await;

        // Raw line preserved byte-for-byte, and the stream keeps going.
        assert_eq!(frames[0], "data: {not json\n\n");
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_unclosed_tag_swallows_chunk_content() {
        let upstream = fixture(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"<thinking>partial\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let frames = collect_frames(stream_repair_reasoning(upstream)).await;

        let payload = frames[0].strip_prefix("data: ").unwrap().trim_end();
        let chunk: Value = serde_json::from_str(payload).unwrap();
        let delta = &chunk["choices"][0]["delta"];
        assert_eq!(delta["reasoning_content"], "partial");
        assert_eq!(delta["content"], "");
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let upstream = fixture(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"",
            ",\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n",
        ]);
        let frames = collect_frames(stream_repair_reasoning(upstream)).await;

        assert_eq!(frames.len(), 2);
        let payload = frames[0].strip_prefix("data: ").unwrap().trim_end();
        let chunk: Value = serde_json::from_str(payload).unwrap();
        assert!(chunk["choices"][0]["delta"]["reasoning_content"].is_null());
    }

    #[tokio::test]
    async fn test_non_data_line_forwarded_as_own_event() {
        let upstream = fixture(&["event: ping\n", "data: [DONE]\n\n"]);
        let frames = collect_frames(stream_repair_reasoning(upstream)).await;

        assert_eq!(frames[0], "event: ping\n\n");
        assert_eq!(frames[1], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_converts_chunks_to_anthropic_events() {
        let upstream = fixture(&[
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hm\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let frames = collect_frames(stream_openai_to_anthropic(upstream)).await;

        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("event: content_block_delta\n"));
        assert!(frames[0].contains("thinking_delta"));
        assert!(frames[1].contains("text_delta"));
        assert!(frames[2].starts_with("event: message_stop\n"));
    }

    #[tokio::test]
    async fn test_conversion_skips_empty_chunks() {
        let upstream = fixture(&[
            "data: {\"choices\":[]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let frames = collect_frames(stream_openai_to_anthropic(upstream)).await;

        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_passthrough_is_byte_identical() {
        let parts = [
            "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\"}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        ];
        let frames = collect_frames(stream_passthrough(fixture(&parts))).await;

        assert_eq!(frames.join(""), parts.join(""));
    }
}
