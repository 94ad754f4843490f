//! Server-Sent Events rendering for browser clients.
//!
//! Each frame is one `data: <json>\n\n` record. A stream opens with `start` and,
//! unless the client goes away, closes with exactly one of `done` or `error`.

use crate::errors::{RelayError, RelayResult};
use crate::runtime::context::RequestContext;
use crate::runtime::core::status_mapper::{
    format_timestamp, is_terminal_state, status_text, update_kind,
};
use crate::sink::rpc::UpstreamConnector;
use crate::translator::UpdateKind;
use a2a_types::{Message, MessageRole, TaskState, TaskStatusUpdateEvent};
use async_stream::stream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One SSE record, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SseFrame {
    Start {
        request_id: String,
        ts: String,
    },
    /// Progress markers and updates without text.
    Status {
        state: TaskState,
        text: String,
        request_id: String,
        ts: String,
    },
    /// Model output.
    Message {
        state: TaskState,
        text: String,
        request_id: String,
        ts: String,
    },
    Done {
        request_id: String,
        ts: String,
    },
    Error {
        message: String,
        request_id: String,
        ts: String,
    },
}

impl SseFrame {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Start { request_id, .. }
            | Self::Status { request_id, .. }
            | Self::Message { request_id, .. }
            | Self::Done { request_id, .. }
            | Self::Error { request_id, .. } => request_id,
        }
    }

    pub fn ts(&self) -> &str {
        match self {
            Self::Start { ts, .. }
            | Self::Status { ts, .. }
            | Self::Message { ts, .. }
            | Self::Done { ts, .. }
            | Self::Error { ts, .. } => ts,
        }
    }

    /// `data: <json>\n\n`
    pub fn encode(&self) -> RelayResult<Bytes> {
        let json = serde_json::to_string(self)?;
        Ok(Bytes::from(format!("data: {json}\n\n")))
    }
}

/// Builds the frames of one stream.
///
/// Timestamps are taken when a frame is built and never go backwards within
/// the stream, even if the wall clock does.
#[derive(Debug)]
pub struct SseEncoder {
    request_id: String,
    last: Option<DateTime<Utc>>,
}

impl SseEncoder {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            last: None,
        }
    }

    fn ts(&mut self) -> String {
        let now = Utc::now();
        let instant = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(instant);
        format_timestamp(instant)
    }

    pub fn start(&mut self) -> SseFrame {
        SseFrame::Start {
            request_id: self.request_id.clone(),
            ts: self.ts(),
        }
    }

    /// Frames a non-final status update.
    pub fn update(&mut self, update: &TaskStatusUpdateEvent) -> SseFrame {
        let text = status_text(&update.status);
        let state = update.status.state;
        let request_id = self.request_id.clone();
        let ts = self.ts();
        match update_kind(update) {
            UpdateKind::Content if !text.is_empty() => SseFrame::Message {
                state,
                text,
                request_id,
                ts,
            },
            _ => SseFrame::Status {
                state,
                text,
                request_id,
                ts,
            },
        }
    }

    pub fn done(&mut self) -> SseFrame {
        SseFrame::Done {
            request_id: self.request_id.clone(),
            ts: self.ts(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) -> SseFrame {
        SseFrame::Error {
            message: message.into(),
            request_id: self.request_id.clone(),
            ts: self.ts(),
        }
    }
}

/// How the upstream part of a stream ended.
enum Outcome {
    Finished(TaskState),
    Failed(RelayError),
    Incomplete,
    Cancelled,
}

/// Relays one request for `text` through `connector` as SSE frames.
///
/// The stream owns the request's cancellation: dropping it (the client went
/// away) cancels the request and with it the upstream run. No frame is produced
/// after that point. A request cancelled while the stream is still open (the
/// server is shutting down) ends with an `error` frame.
pub fn relay_frames(
    connector: Arc<dyn UpstreamConnector>,
    text: String,
    ctx: RequestContext,
) -> impl Stream<Item = SseFrame> + Send {
    stream! {
        let _cancel_on_drop = ctx.cancel_on_drop();
        let mut encoder = SseEncoder::new(ctx.request_id());
        info!(request_id = %ctx.request_id(), "sse stream opened");
        yield encoder.start();

        let cancel = ctx.cancel_token().clone();
        let mut connection = match connector.connect(&ctx).await {
            Ok(connection) => connection,
            Err(err) => {
                yield encoder.error(err.to_string());
                return;
            }
        };

        let message = Message::text(MessageRole::User, Uuid::new_v4().to_string(), text);
        let sent = tokio::select! {
            () = cancel.cancelled() => None,
            sent = connection.send_message(message) => Some(sent),
        };
        let outcome = match sent {
            None => Outcome::Cancelled,
            Some(Ok(mut updates)) => {
                let mut outcome = Outcome::Incomplete;
                loop {
                    let item = tokio::select! {
                        () = cancel.cancelled() => {
                            outcome = Outcome::Cancelled;
                            break;
                        }
                        item = updates.next() => match item {
                            Some(item) => item,
                            None => break,
                        },
                    };
                    match item {
                        Ok((_, Some(update))) => {
                            yield encoder.update(&update);
                        }
                        Ok((task, None)) if is_terminal_state(&task.status.state) => {
                            outcome = Outcome::Finished(task.status.state);
                            break;
                        }
                        Ok((_, None)) => {}
                        Err(err) => {
                            outcome = Outcome::Failed(err);
                            break;
                        }
                    }
                }
                outcome
            }
            Some(Err(err)) => Outcome::Failed(err),
        };
        connection.close().await;

        match outcome {
            Outcome::Finished(TaskState::Completed) => {
                debug!(request_id = %ctx.request_id(), "sse stream done");
                yield encoder.done();
            }
            Outcome::Finished(state) => {
                yield encoder.error(format!("Task ended in state {state}"));
            }
            Outcome::Failed(err) => {
                debug!(request_id = %ctx.request_id(), error = %err, "sse stream failed");
                yield encoder.error(err.to_string());
            }
            Outcome::Incomplete => {
                yield encoder.error("upstream stream ended before the task finished");
            }
            Outcome::Cancelled => {
                debug!(request_id = %ctx.request_id(), "sse stream cancelled");
                yield encoder.error("request cancelled: server shutting down");
            }
        }
    }
}

/// Encodes frames for an HTTP body.
pub fn encode_frames(
    frames: impl Stream<Item = SseFrame> + Send,
) -> impl Stream<Item = RelayResult<Bytes>> + Send {
    frames.map(|frame| frame.encode())
}
