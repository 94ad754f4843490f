//! Shared fixtures and helpers for taskrelay tests.
//!
//! Available when the `test-support` feature is enabled or when running tests.

use crate::config::RelayConfig;
use crate::events::{EventSource, ExecutionEvent, ScriptStep, ScriptedEventSource};
use crate::runtime::RelayRuntime;
use crate::sink::sse::SseFrame;
use axum::response::Response;
use std::sync::Arc;

/// Events of the "What defense beats a 4-3?" run.
pub fn football_events() -> Vec<ExecutionEvent> {
    vec![
        ExecutionEvent::subtask_start("football-agent"),
        ExecutionEvent::model_output("Use a Cover 2 with a robber safety."),
        ExecutionEvent::subtask_end("football-agent"),
    ]
}

/// A source that emits `events` and then fails mid-stream with `reason`.
pub fn failing_after(
    events: impl IntoIterator<Item = ExecutionEvent>,
    reason: impl Into<String>,
) -> ScriptedEventSource {
    let mut steps: Vec<ScriptStep> = events
        .into_iter()
        .map(|event| ScriptStep::Emit { event })
        .collect();
    steps.push(ScriptStep::Fail {
        reason: reason.into(),
    });
    ScriptedEventSource::new(steps)
}

/// A source that emits `events` and then never finishes on its own.
pub fn hanging_after(events: impl IntoIterator<Item = ExecutionEvent>) -> ScriptedEventSource {
    let mut steps: Vec<ScriptStep> = events
        .into_iter()
        .map(|event| ScriptStep::Emit { event })
        .collect();
    steps.push(ScriptStep::Hang);
    ScriptedEventSource::new(steps)
}

/// A runtime on default configuration driven by `source`.
pub fn runtime_with(source: impl EventSource + 'static) -> Arc<RelayRuntime> {
    match RelayRuntime::builder(RelayConfig::default())
        .event_source(source)
        .build()
    {
        Ok(runtime) => Arc::new(runtime),
        Err(err) => panic!("default configuration must build: {err}"),
    }
}

/// Payloads of every `data:` record in an SSE body, in order.
pub fn sse_data(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|record| {
            let data: Vec<&str> = record
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|value| value.strip_prefix(' ').unwrap_or(value))
                .collect();
            (!data.is_empty()).then(|| data.join("\n"))
        })
        .collect()
}

/// Parses `/api/stream` frames out of an SSE body.
pub fn parse_sse_frames(body: &str) -> Vec<SseFrame> {
    sse_data(body)
        .iter()
        .map(|data| match serde_json::from_str(data) {
            Ok(frame) => frame,
            Err(err) => panic!("invalid frame {data:?}: {err}"),
        })
        .collect()
}

/// Collects a response body as UTF-8.
pub async fn body_text(response: Response) -> String {
    let bytes = match axum::body::to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => panic!("failed to read body: {err}"),
    };
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => text,
        Err(err) => panic!("body is not UTF-8: {err}"),
    }
}
