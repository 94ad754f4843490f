//! In-process event sources.
//!
//! [`ScriptedEventSource`] replays a fixed script of steps for every run; it backs the
//! `scripted` configuration mode and the test suite. [`EchoEventSource`] answers
//! every request with its own input, which is handy for smoke-testing a deployment.

use super::{EventSource, ExecutionEvent, ExecutionEventStream};
use crate::errors::{RelayError, RelayResult};
use async_stream::stream;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One step of a scripted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Produce an event.
    Emit { event: ExecutionEvent },
    /// Sleep before the next step.
    Wait { millis: u64 },
    /// End the run with an upstream failure.
    Fail { reason: String },
    /// Never produce anything else; only cancellation ends the run.
    Hang,
}

/// Counters shared by every run of a scripted source.
#[derive(Debug, Default)]
struct RunCounters {
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Marks a run as released when the event stream is dropped.
struct ReleaseOnDrop(Arc<RunCounters>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Replays the same script for every run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEventSource {
    steps: Arc<Vec<ScriptStep>>,
    refuse_reason: Option<String>,
    counters: Arc<RunCounters>,
}

impl ScriptedEventSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: Arc::new(steps),
            refuse_reason: None,
            counters: Arc::default(),
        }
    }

    /// A script made only of events.
    pub fn from_events(events: impl IntoIterator<Item = ExecutionEvent>) -> Self {
        Self::new(
            events
                .into_iter()
                .map(|event| ScriptStep::Emit { event })
                .collect(),
        )
    }

    /// A source whose runs can never be opened.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            refuse_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Number of runs opened so far.
    pub fn runs_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Number of runs whose event stream has been dropped.
    pub fn runs_released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EventSource for ScriptedEventSource {
    async fn stream_events(
        &self,
        _input: &str,
        cancel: CancellationToken,
    ) -> RelayResult<ExecutionEventStream> {
        if let Some(reason) = &self.refuse_reason {
            return Err(RelayError::UpstreamUnavailable {
                reason: reason.clone(),
            });
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let release = ReleaseOnDrop(self.counters.clone());
        let steps = self.steps.clone();

        let events = stream! {
            let _release = release;
            for step in steps.iter() {
                if cancel.is_cancelled() {
                    return;
                }
                match step {
                    ScriptStep::Emit { event } => yield Ok(event.clone()),
                    ScriptStep::Wait { millis } => {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(Duration::from_millis(*millis)) => {}
                        }
                    }
                    ScriptStep::Fail { reason } => {
                        yield Err(RelayError::UpstreamFailure { reason: reason.clone() });
                        return;
                    }
                    ScriptStep::Hang => {
                        cancel.cancelled().await;
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(events))
    }
}

/// Answers each request with a single model output equal to the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoEventSource;

#[async_trait::async_trait]
impl EventSource for EchoEventSource {
    async fn stream_events(
        &self,
        input: &str,
        _cancel: CancellationToken,
    ) -> RelayResult<ExecutionEventStream> {
        let event = ExecutionEvent::model_output(input);
        Ok(Box::pin(futures::stream::iter([Ok(event)])))
    }
}
