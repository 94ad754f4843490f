//! Browser-facing `/api` handlers.

use crate::errors::RelayError;
use crate::runtime::{RelayRuntime, RequestContext};
use crate::sink::sse::{encode_frames, relay_frames};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub text: Option<String>,
}

/// `GET /api/stream?text=...`
///
/// Streams the task started for `text` as SSE frames. Closing the connection
/// cancels the task, and so does server shutdown.
pub async fn stream_handler(
    State(runtime): State<Arc<RelayRuntime>>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let text = match query.text {
        Some(text) if !text.is_empty() => text,
        _ => {
            return RelayError::InvalidInput("query parameter 'text' is required".to_string())
                .into_response()
        }
    };

    let ctx = RequestContext::child_of(runtime.executor().shutdown_token());
    let frames = relay_frames(runtime.connector(), text, ctx);
    let mut response = Body::from_stream(encode_frames(frames)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// `GET /api/health`
pub async fn health_handler(State(runtime): State<Arc<RelayRuntime>>) -> Response {
    Json(json!({
        "ok": "true",
        "upstream_base_url": runtime.connector().base_url(),
    }))
    .into_response()
}
