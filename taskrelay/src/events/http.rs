//! Event source backed by an external agent engine over HTTP.
//!
//! The engine is called with `POST <url>` and a `{"input": "..."}` body and must answer
//! with `text/event-stream`, one JSON-encoded [`ExecutionEvent`] per `data:` frame.

use super::{EventSource, ExecutionEvent, ExecutionEventStream};
use crate::errors::{RelayError, RelayResult};
use a2a_client::sse;
use async_stream::stream;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpEventSource {
    client: Client,
    url: String,
}

impl HttpEventSource {
    pub fn new(url: impl Into<String>) -> RelayResult<Self> {
        Self::with_client(url, Client::new())
    }

    pub fn with_client(url: impl Into<String>, client: Client) -> RelayResult<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RelayError::InvalidConfiguration {
                field: "event_source.url".to_string(),
                reason: format!("expected an http(s) URL, got '{url}'"),
            });
        }
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl EventSource for HttpEventSource {
    async fn stream_events(
        &self,
        input: &str,
        cancel: CancellationToken,
    ) -> RelayResult<ExecutionEventStream> {
        let request = self
            .client
            .post(&self.url)
            .header("Accept", "text/event-stream")
            .json(&json!({ "input": input }))
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::ClientDisconnected),
            response = request => response.map_err(|e| RelayError::UpstreamUnavailable {
                reason: format!("failed to reach event source {}: {}", self.url, e),
            })?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::UpstreamUnavailable {
                reason: format!("event source returned HTTP {status}: {body}"),
            });
        }

        debug!(url = %self.url, "event source stream opened");

        let frames = sse::data_stream(response.bytes_stream());
        let events = stream! {
            let mut frames = Box::pin(frames);
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    frame = frames.next() => frame,
                };

                match frame {
                    None => return,
                    Some(Ok(data)) => match serde_json::from_str::<ExecutionEvent>(&data) {
                        Ok(event) => yield Ok(event),
                        Err(err) => {
                            warn!(error = %err, "malformed execution event");
                            yield Err(RelayError::UpstreamFailure {
                                reason: format!("malformed execution event: {err}"),
                            });
                            return;
                        }
                    },
                    Some(Err(err)) => {
                        yield Err(RelayError::UpstreamFailure {
                            reason: format!("event stream interrupted: {err}"),
                        });
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(events))
    }
}
