pub mod anthropic;
pub mod health;
pub mod openai;

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::Stream;

use crate::error::ProxyError;

/// Relay an upstream response to the client verbatim: status, headers, and
/// body. Hop-by-hop framing headers are dropped since the body is re-framed.
pub(crate) async fn relay_upstream(response: reqwest::Response) -> Response {
    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers() {
        if matches!(
            name.as_str(),
            "transfer-encoding" | "connection" | "content-length"
        ) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let bytes = response.bytes().await.unwrap_or_default();
    builder
        .body(Body::from(bytes))
        .unwrap_or_else(|e| ProxyError::Internal(e.to_string()).into_response())
}

/// Wrap a corrected event stream in an SSE response.
pub(crate) fn sse_response(
    stream: impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| ProxyError::Internal(e.to_string()).into_response())
}
