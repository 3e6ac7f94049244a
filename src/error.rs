use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Failed to parse upstream response: {0}")]
    ParseError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Convert error to OpenAI-compatible error response
    pub fn to_openai_response(&self) -> Response {
        let (status, message) = match self {
            ProxyError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ProxyError::NetworkError(_) | ProxyError::ParseError(_) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }

    /// Convert error to Anthropic-compatible error response
    pub fn to_anthropic_response(&self) -> Response {
        let (status, error_type, message) = match self {
            ProxyError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                self.to_string(),
            ),
            ProxyError::NetworkError(_) | ProxyError::ParseError(_) => {
                (StatusCode::BAD_GATEWAY, "api_error", self.to_string())
            }
        };

        (
            status,
            Json(json!({
                "type": "error",
                "error": {
                    "type": error_type,
                    "message": message
                }
            })),
        )
            .into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // Default to Anthropic format
        self.to_anthropic_response()
    }
}
