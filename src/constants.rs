use std::time::Duration;

/// Upstream sub-path for OpenAI-style chat completions
pub const UPSTREAM_CHAT_PATH: &str = "/chat/completions";

/// Upstream sub-path for Anthropic-style messages
pub const UPSTREAM_MESSAGES_PATH: &str = "/v1/messages";

/// Upstream sub-path for the model listing
pub const UPSTREAM_MODELS_PATH: &str = "/models";

/// Anthropic API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Placeholder reasoning for replayed tool-call turns. The upstream requires
/// a non-empty reasoning field on these turns; this sentinel tells the model
/// it is continuing an earlier thought, not recovering the real one.
pub const REASONING_PLACEHOLDER: &str = "[Continuing previous tool execution analysis...]";

/// Model substituted when an Anthropic-format request names none
pub const DEFAULT_MODEL: &str = "kimi-k2.5";

/// max_tokens substituted when an Anthropic-format request names none
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Thinking mode needs generous output headroom; smaller budgets get raised
pub const THINKING_MIN_MAX_TOKENS: u64 = 16000;

/// Full round-trip deadline for buffered (non-streaming) upstream calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection establishment deadline for the shared client
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
