//! Execution events produced by an agent run.
//!
//! An [`EventSource`] turns one user request into a finite, totally ordered stream of
//! [`ExecutionEvent`]s. Everything downstream (translation, task state, sinks) only
//! ever sees this enum, so new upstream engines plug in by implementing the trait.

pub mod http;
pub mod scripted;

pub use http::HttpEventSource;
pub use scripted::{EchoEventSource, ScriptStep, ScriptedEventSource};

use crate::errors::RelayResult;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// One observation of an agent run.
///
/// On the wire the variant is carried in the `event` field:
/// `{"event": "subtask_start", "name": "football-agent"}`.
/// Unrecognized tags deserialize to [`ExecutionEvent::Unknown`] so newer engines
/// can add event kinds without breaking the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A model call finished; `text` may be empty.
    ModelOutput { text: String },
    /// A delegated sub-task started.
    SubtaskStart { name: String },
    /// A delegated sub-task returned.
    SubtaskEnd { name: String },
    #[serde(other)]
    Unknown,
}

impl ExecutionEvent {
    pub fn model_output(text: impl Into<String>) -> Self {
        Self::ModelOutput { text: text.into() }
    }

    pub fn subtask_start(name: impl Into<String>) -> Self {
        Self::SubtaskStart { name: name.into() }
    }

    pub fn subtask_end(name: impl Into<String>) -> Self {
        Self::SubtaskEnd { name: name.into() }
    }
}

/// Events of one run. An `Err` item ends the run.
pub type ExecutionEventStream = Pin<Box<dyn Stream<Item = RelayResult<ExecutionEvent>> + Send>>;

/// Producer of execution events for a single agent run.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Starts a run for `input`.
    ///
    /// An error returned here means no event was produced and is treated as the
    /// upstream being unavailable. Implementations must stop producing once
    /// `cancel` fires and release their connection when the stream is dropped.
    async fn stream_events(
        &self,
        input: &str,
        cancel: CancellationToken,
    ) -> RelayResult<ExecutionEventStream>;
}
