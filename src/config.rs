use std::env;

use dotenvy::dotenv;

/// Wire protocol spoken by the configured upstream for the messages route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFormat {
    /// Upstream accepts Anthropic-format bodies; messages are passed through
    Anthropic,
    /// Upstream only speaks the OpenAI format; messages are converted both ways
    OpenAI,
}

/// CORS configuration mode
#[derive(Debug, Clone)]
pub enum CorsMode {
    /// Only allow localhost origins (default, for local development)
    LocalhostOnly,
    /// Allow all origins
    AllowAll,
    /// Allow specific origins (comma-separated list)
    AllowList(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Base URL of the upstream inference endpoint
    pub upstream_url: String,
    pub upstream_format: UpstreamFormat,
    /// Optional egress proxy for the outbound client
    pub https_proxy: Option<String>,
    pub cors_mode: CorsMode,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let host = env::var("KIMI_PROXY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("KIMI_PROXY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let upstream_url = env::var("KIMI_PROXY_UPSTREAM_URL")
            .unwrap_or_else(|_| "https://zenmux.ai/api/anthropic".to_string());
        let upstream_url = upstream_url.trim_end_matches('/').to_string();

        let upstream_format = match env::var("KIMI_PROXY_UPSTREAM_FORMAT")
            .as_deref()
            .map(str::to_lowercase)
            .as_deref()
        {
            Ok("openai") => UpstreamFormat::OpenAI,
            _ => UpstreamFormat::Anthropic,
        };

        let https_proxy = env::var("KIMI_PROXY_HTTPS_PROXY")
            .ok()
            .filter(|p| !p.is_empty());

        // CORS configuration: "localhost" (default), "*" (allow all), or comma-separated origins
        let cors_mode = match env::var("KIMI_PROXY_CORS_ORIGINS").as_deref() {
            Ok("*") => CorsMode::AllowAll,
            Ok(origins) if !origins.is_empty() => {
                CorsMode::AllowList(origins.split(',').map(|s| s.trim().to_string()).collect())
            }
            _ => CorsMode::LocalhostOnly,
        };

        Self {
            host,
            port,
            upstream_url,
            upstream_format,
            https_proxy,
            cors_mode,
        }
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}{}", self.upstream_url, crate::constants::UPSTREAM_CHAT_PATH)
    }

    pub fn messages_url(&self) -> String {
        format!("{}{}", self.upstream_url, crate::constants::UPSTREAM_MESSAGES_PATH)
    }

    pub fn models_url(&self) -> String {
        format!("{}{}", self.upstream_url, crate::constants::UPSTREAM_MODELS_PATH)
    }
}
