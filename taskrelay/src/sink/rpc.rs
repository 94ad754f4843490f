//! Task update streams for RPC clients.
//!
//! Every stream item pairs the task as currently known with the update that
//! produced it. Items with no update carry either the snapshot a subscriber
//! attached to (first item) or the final state (last item).

use crate::errors::{RelayError, RelayResult};
use crate::runtime::context::RequestContext;
use crate::runtime::core::executor::{ExecutionLink, RequestExecutor};
use crate::runtime::core::status_mapper::{create_status_update_event, is_terminal_state, now};
use crate::task::{history_from_events, TaskEvent, TaskStateMachine, TaskSubscription};
use a2a_client::{A2AClient, StreamingResults};
use a2a_types::{
    Message, MessageSendParams, SendStreamingMessageResult, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// A task paired with the status update that produced it, if any.
pub type TaskUpdate = (a2a_types::Task, Option<TaskStatusUpdateEvent>);

/// Stream of [`TaskUpdate`]s; an `Err` item ends it.
pub type TaskUpdateStream = Pin<Box<dyn Stream<Item = RelayResult<TaskUpdate>> + Send>>;

/// Renders a subscription as a [`TaskUpdateStream`].
///
/// - a terminal task yields only the final signal;
/// - otherwise the snapshot comes first, then one item per non-final update
///   logged after it, then the final signal;
/// - an upstream error ends the stream with `UpstreamFailure`.
pub fn task_updates(
    state: Arc<TaskStateMachine>,
    subscription: TaskSubscription,
) -> TaskUpdateStream {
    Box::pin(stream! {
        let TaskSubscription { snapshot, baseline, stalled, mut receiver } = subscription;

        if snapshot.is_terminal() {
            let history = load_history(&state, &snapshot.id).await;
            yield Ok((snapshot.to_a2a(history), None));
            return;
        }

        let mut current = snapshot.to_a2a(Vec::new());
        yield Ok((current.clone(), None));

        if let Some(reason) = stalled {
            yield Err(RelayError::UpstreamFailure { reason });
            return;
        }

        while let Some(entry) = receiver.recv().await {
            if entry.sequence <= baseline {
                continue;
            }
            match entry.event {
                TaskEvent::StatusUpdate(update) if update.is_final => {
                    current.status = update.status;
                    current.history = load_history(&state, &current.id).await;
                    yield Ok((current, None));
                    return;
                }
                TaskEvent::StatusUpdate(update) => {
                    current.status = update.status.clone();
                    yield Ok((current.clone(), Some(update)));
                }
                TaskEvent::UpstreamError { message, .. } => {
                    yield Err(RelayError::UpstreamFailure { reason: message });
                    return;
                }
                TaskEvent::Message(_) => {}
            }
        }

        // Sealing always publishes the final event first, so this only happens
        // when the bus was torn down underneath us.
        match state.snapshot(&current.id).await {
            Ok(task) if task.is_terminal() => {
                let history = load_history(&state, &task.id).await;
                yield Ok((task.to_a2a(history), None));
            }
            Ok(_) => {
                yield Err(RelayError::Internal {
                    component: "rpc sink".to_string(),
                    reason: format!("update stream of task {} closed early", current.id),
                });
            }
            Err(err) => {
                yield Err(err);
            }
        }
    })
}

async fn load_history(state: &TaskStateMachine, task_id: &str) -> Vec<Message> {
    match state.events(task_id).await {
        Ok(events) => history_from_events(&events),
        Err(err) => {
            warn!(task_id = %task_id, error = %err, "task history unavailable");
            Vec::new()
        }
    }
}

/// Opens connections to whatever executes tasks.
#[async_trait::async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Opens a connection on behalf of one request.
    async fn connect(&self, ctx: &RequestContext) -> RelayResult<Box<dyn TaskConnection>>;

    /// Base URL of the upstream, as reported by the health endpoint.
    fn base_url(&self) -> &str;
}

/// One open connection to an upstream.
#[async_trait::async_trait]
pub trait TaskConnection: Send {
    /// Sends a user message and streams the updates of the task it starts.
    async fn send_message(&mut self, message: Message) -> RelayResult<TaskUpdateStream>;

    /// Releases the connection.
    async fn close(&mut self);
}

fn closed_connection() -> RelayError {
    RelayError::Internal {
        component: "connection".to_string(),
        reason: "connection already closed".to_string(),
    }
}

/// Connects to the in-process executor.
///
/// Runs started through this connector are linked to the request: when the
/// request is cancelled, so is the run.
#[derive(Clone)]
pub struct LocalConnector {
    executor: RequestExecutor,
    base_url: String,
}

impl LocalConnector {
    pub fn new(executor: RequestExecutor, base_url: impl Into<String>) -> Self {
        Self {
            executor,
            base_url: base_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl UpstreamConnector for LocalConnector {
    async fn connect(&self, ctx: &RequestContext) -> RelayResult<Box<dyn TaskConnection>> {
        Ok(Box::new(LocalConnection {
            executor: self.executor.clone(),
            ctx: ctx.clone(),
            open: true,
        }))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

struct LocalConnection {
    executor: RequestExecutor,
    ctx: RequestContext,
    open: bool,
}

#[async_trait::async_trait]
impl TaskConnection for LocalConnection {
    async fn send_message(&mut self, message: Message) -> RelayResult<TaskUpdateStream> {
        if !self.open {
            return Err(closed_connection());
        }
        let subscription = self
            .executor
            .start_task(message, &self.ctx, ExecutionLink::Linked)
            .await?;
        Ok(task_updates(self.executor.state().clone(), subscription))
    }

    async fn close(&mut self) {
        self.open = false;
        debug!(request_id = %self.ctx.request_id(), "local connection closed");
    }
}

/// Connects to a remote A2A agent over HTTP.
#[derive(Clone, Debug)]
pub struct RemoteConnector {
    client: A2AClient,
    base_url: String,
}

impl RemoteConnector {
    /// # Errors
    ///
    /// `InvalidConfiguration` when `base_url` is not an http(s) URL.
    pub fn new(base_url: impl Into<String>) -> RelayResult<Self> {
        let base_url = base_url.into();
        let client =
            A2AClient::new(&base_url).map_err(|err| RelayError::InvalidConfiguration {
                field: "upstream.base_url".to_string(),
                reason: err.to_string(),
            })?;
        Ok(Self { client, base_url })
    }
}

#[async_trait::async_trait]
impl UpstreamConnector for RemoteConnector {
    async fn connect(&self, ctx: &RequestContext) -> RelayResult<Box<dyn TaskConnection>> {
        debug!(request_id = %ctx.request_id(), url = %self.client.rpc_url(), "opening remote connection");
        Ok(Box::new(RemoteConnection {
            client: Some(self.client.clone()),
        }))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

struct RemoteConnection {
    client: Option<A2AClient>,
}

#[async_trait::async_trait]
impl TaskConnection for RemoteConnection {
    async fn send_message(&mut self, message: Message) -> RelayResult<TaskUpdateStream> {
        let client = self.client.as_ref().ok_or_else(closed_connection)?;
        let params = MessageSendParams {
            message,
            configuration: None,
            metadata: None,
        };
        let results = client
            .send_streaming_message(params)
            .await
            .map_err(|err| RelayError::from(err).into_unavailable())?;
        Ok(remote_updates(results))
    }

    async fn close(&mut self) {
        self.client = None;
    }
}

/// One console line for a stream item: `state=<s>` for snapshots and final
/// signals, `state=<s> text=<t>` for updates. Text parts are joined by spaces.
pub fn describe_update((task, update): &TaskUpdate) -> String {
    let state = task.status.state;
    match update {
        None => format!("state={state}"),
        Some(update) => {
            let text = update
                .status
                .message
                .as_ref()
                .map(|message| {
                    message
                        .parts
                        .iter()
                        .filter_map(|part| part.as_text())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            format!("state={state} text={text}")
        }
    }
}

/// Converts a remote `message/stream` into a [`TaskUpdateStream`].
///
/// Stops after the first terminal signal. Agents that answer with bare messages
/// instead of a task are presented as a synthetic task that completes when
/// their stream ends.
pub fn remote_updates(results: StreamingResults) -> TaskUpdateStream {
    Box::pin(stream! {
        let mut results = results;
        let mut current: Option<a2a_types::Task> = None;
        let mut synthetic = false;

        while let Some(item) = results.next().await {
            let result = match item {
                Ok(result) => result,
                Err(err) => {
                    yield Err(RelayError::from(err).into_failure());
                    return;
                }
            };

            match result {
                SendStreamingMessageResult::Task(task) => {
                    let terminal = is_terminal_state(&task.status.state);
                    current = Some(task.clone());
                    synthetic = false;
                    yield Ok((task, None));
                    if terminal {
                        return;
                    }
                }
                SendStreamingMessageResult::TaskStatusUpdate(update) => {
                    let mut task = current
                        .take()
                        .unwrap_or_else(|| task_from_update(&update));
                    task.status = update.status.clone();
                    current = Some(task.clone());
                    if update.is_final || is_terminal_state(&update.status.state) {
                        yield Ok((task, None));
                        return;
                    }
                    yield Ok((task, Some(update)));
                }
                SendStreamingMessageResult::Message(message) => {
                    if current.is_none() {
                        synthetic = true;
                    }
                    let mut task = current
                        .take()
                        .unwrap_or_else(|| task_from_message(&message));
                    let status = TaskStatus {
                        state: TaskState::Working,
                        timestamp: Some(now()),
                        message: Some(message),
                    };
                    let update =
                        create_status_update_event(&task.id, &task.context_id, status, false);
                    task.status = update.status.clone();
                    current = Some(task.clone());
                    yield Ok((task, Some(update)));
                }
            }
        }

        match current {
            Some(mut task) if synthetic => {
                task.status = TaskStatus {
                    state: TaskState::Completed,
                    timestamp: Some(now()),
                    message: None,
                };
                yield Ok((task, None));
            }
            _ => {
                yield Err(RelayError::UpstreamFailure {
                    reason: "upstream stream ended before the task finished".to_string(),
                });
            }
        }
    })
}

fn task_from_update(update: &TaskStatusUpdateEvent) -> a2a_types::Task {
    a2a_types::Task {
        kind: a2a_types::TASK_KIND.to_string(),
        id: update.task_id.clone(),
        context_id: update.context_id.clone(),
        status: update.status.clone(),
        history: Vec::new(),
        metadata: None,
    }
}

fn task_from_message(message: &Message) -> a2a_types::Task {
    a2a_types::Task {
        kind: a2a_types::TASK_KIND.to_string(),
        id: message
            .task_id
            .clone()
            .unwrap_or_else(|| message.message_id.clone()),
        context_id: message.context_id.clone().unwrap_or_default(),
        status: TaskStatus {
            state: TaskState::Working,
            timestamp: Some(now()),
            message: None,
        },
        history: Vec::new(),
        metadata: None,
    }
}
