//! Request lifecycle management.
//!
//! The [`RequestExecutor`] turns one client call into one task and one event
//! source run. The run is driven on its own tokio task: every event is translated
//! and applied through the state machine, and the run ends in exactly one of
//!
//! - `complete()` once the event source is exhausted,
//! - `cancel()` when the execution token fires,
//! - an `UpstreamError` event when the event source fails (the task keeps its last
//!   non-terminal state).
//!
//! The event source stream is dropped on every exit path before the task is
//! finalized, so the upstream connection never outlives the run.

use crate::errors::{RelayError, RelayResult};
use crate::events::EventSource;
use crate::runtime::context::RequestContext;
use crate::task::{history_from_events, TaskEvent, TaskStateMachine, TaskSubscription};
use crate::translator::{translate, UpdateTarget};
use a2a_types::{Message, TaskState};
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How a run relates to the request that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionLink {
    /// The run is cancelled when the request is (SSE clients going away).
    Linked,
    /// The run outlives the request; only `tasks/cancel` stops it.
    Detached,
}

/// Drives event source runs and owns their cancellation tokens.
#[derive(Clone)]
pub struct RequestExecutor {
    state: Arc<TaskStateMachine>,
    source: Arc<dyn EventSource>,
    executions: Arc<DashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
}

impl RequestExecutor {
    pub fn new(state: Arc<TaskStateMachine>, source: Arc<dyn EventSource>) -> Self {
        Self {
            state,
            source,
            executions: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &Arc<TaskStateMachine> {
        &self.state
    }

    /// Number of runs still in flight.
    pub fn active_executions(&self) -> usize {
        self.executions.len()
    }

    /// Cancelled once the executor starts shutting down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Cancels every run in flight, and every run started from now on.
    /// Returns how many runs were cancelled.
    pub fn shutdown(&self) -> usize {
        self.shutdown.cancel();
        let mut cancelled = 0;
        for entry in self.executions.iter() {
            entry.value().cancel();
            cancelled += 1;
        }
        cancelled
    }

    /// Creates a task for `message` and starts its run in the background.
    ///
    /// The returned subscription is taken before the run starts, so it observes
    /// every update the run produces.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the message has no text or targets an existing task.
    pub async fn start_task(
        &self,
        message: Message,
        ctx: &RequestContext,
        link: ExecutionLink,
    ) -> RelayResult<TaskSubscription> {
        if let Some(task_id) = &message.task_id {
            return Err(RelayError::InvalidInput(format!(
                "continuing task {task_id} is not supported; send a new message without taskId"
            )));
        }
        let input = message.text_content();
        if input.is_empty() {
            return Err(RelayError::InvalidInput(
                "message must contain a non-empty text part".to_string(),
            ));
        }

        let task = self.state.create(message).await?;
        let subscription = self.state.subscribe(&task.id).await?;

        let cancel = match link {
            ExecutionLink::Linked => ctx.cancel_token().child_token(),
            ExecutionLink::Detached => CancellationToken::new(),
        };
        self.executions.insert(task.id.clone(), cancel.clone());
        if self.shutdown.is_cancelled() {
            cancel.cancel();
        }

        let target = UpdateTarget {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            request_id: ctx.request_id().to_string(),
        };
        info!(task_id = %task.id, request_id = %ctx.request_id(), ?link, "starting execution");

        let executor = self.clone();
        tokio::spawn(async move { executor.drive_execution(target, input, cancel).await });

        Ok(subscription)
    }

    /// Runs `message` to a terminal state and returns the finished task.
    ///
    /// Backs the blocking `message/send` call.
    ///
    /// # Errors
    ///
    /// `UpstreamFailure` when the run ends with an upstream error.
    pub async fn send_blocking(
        &self,
        message: Message,
        ctx: &RequestContext,
    ) -> RelayResult<a2a_types::Task> {
        let mut subscription = self
            .start_task(message, ctx, ExecutionLink::Detached)
            .await?;
        let task_id = subscription.snapshot.id.clone();

        while let Some(entry) = subscription.receiver.recv().await {
            match entry.event {
                TaskEvent::UpstreamError { message, .. } => {
                    return Err(RelayError::UpstreamFailure { reason: message });
                }
                event if event.is_final() => break,
                _ => {}
            }
        }
        self.get_task(&task_id, None).await
    }

    /// Current snapshot of a task with its history.
    ///
    /// `history_length` keeps only the most recent messages.
    pub async fn get_task(
        &self,
        task_id: &str,
        history_length: Option<i32>,
    ) -> RelayResult<a2a_types::Task> {
        let task = self.state.snapshot(task_id).await?;
        let events = self.state.events(task_id).await?;
        let mut history = history_from_events(&events);
        if let Some(limit) = history_length.and_then(|n| usize::try_from(n).ok()) {
            let skip = history.len().saturating_sub(limit);
            history.drain(..skip);
        }
        Ok(task.to_a2a(history))
    }

    /// Subscribes to an existing task.
    pub async fn resubscribe(&self, task_id: &str) -> RelayResult<TaskSubscription> {
        self.state.subscribe(task_id).await
    }

    /// Cancels a running task and stops its run.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when the task already reached another terminal state.
    pub async fn cancel_task(&self, task_id: &str) -> RelayResult<a2a_types::Task> {
        let task = self.state.snapshot(task_id).await?;
        if task.is_terminal() {
            return Err(RelayError::InvalidTransition {
                task_id: task.id,
                from: task.status.state,
                to: TaskState::Canceled,
            });
        }

        if let Some(token) = self.executions.get(task_id) {
            token.cancel();
        }
        match self.state.cancel(task_id).await {
            Ok(_) => {}
            // The run may have observed the token and cancelled first
            Err(RelayError::InvalidTransition { .. }) => {
                let current = self.state.snapshot(task_id).await?;
                if current.status.state != TaskState::Canceled {
                    return Err(RelayError::InvalidTransition {
                        task_id: current.id,
                        from: current.status.state,
                        to: TaskState::Canceled,
                    });
                }
            }
            Err(err) => return Err(err),
        }
        self.get_task(task_id, None).await
    }

    async fn drive_execution(self, target: UpdateTarget, input: String, cancel: CancellationToken) {
        let task_id = target.task_id.clone();
        let outcome = self.run(&target, &input, &cancel).await;
        self.executions.remove(&task_id);

        match outcome {
            Ok(()) => debug!(task_id = %task_id, "execution finished"),
            Err(RelayError::ClientDisconnected) => {
                match self.state.cancel(&task_id).await {
                    Ok(_) | Err(RelayError::InvalidTransition { .. }) => {}
                    Err(err) => {
                        error!(task_id = %task_id, error = %err, "failed to cancel task");
                    }
                }
                debug!(task_id = %task_id, "execution cancelled");
            }
            Err(
                RelayError::UpstreamUnavailable { reason } | RelayError::UpstreamFailure { reason },
            ) => {
                if let Err(record_err) = self.state.record_upstream_error(&task_id, &reason).await {
                    // Only a concurrent cancel can seal the task here
                    debug!(task_id = %task_id, error = %record_err, "upstream error not recorded");
                }
            }
            Err(RelayError::InvalidTransition { .. }) if cancel.is_cancelled() => {
                debug!(task_id = %task_id, "task cancelled during execution");
            }
            Err(err) => {
                error!(task_id = %task_id, request_id = %target.request_id, error = %err, "execution aborted");
            }
        }
    }

    async fn run(
        &self,
        target: &UpdateTarget,
        input: &str,
        cancel: &CancellationToken,
    ) -> RelayResult<()> {
        let mut events = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RelayError::ClientDisconnected),
            opened = self.source.stream_events(input, cancel.clone()) => {
                opened.map_err(RelayError::into_unavailable)?
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RelayError::ClientDisconnected),
                next = events.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    if let Some(update) = translate(&event, target) {
                        self.state.apply_update(update).await?;
                    }
                }
                Some(Err(err)) => return Err(err.into_failure()),
                None if cancel.is_cancelled() => return Err(RelayError::ClientDisconnected),
                None => break,
            }
        }
        drop(events);

        self.state.complete(&target.task_id).await?;
        Ok(())
    }
}
