//! Request/response transformations for the thinking-model proxy.
//!
//! This module provides:
//! - `reasoning`: reasoning_content repair for histories, responses, and
//!   stream deltas
//! - `openai_compat`: Anthropic ↔ OpenAI format conversion
//! - `streaming`: SSE stream transformations

pub mod openai_compat;
pub mod reasoning;
pub mod streaming;

// Re-export commonly used items
pub use openai_compat::{chunk_to_anthropic_event, to_anthropic_response, to_openai_request};
pub use reasoning::{
    fix_anthropic_request_history, fix_request_history, repair_response_message,
};
pub use streaming::{stream_openai_to_anthropic, stream_passthrough, stream_repair_reasoning};
