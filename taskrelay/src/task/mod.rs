//! Task model, storage and lifecycle.
//!
//! A [`Task`] is the unit clients observe. Its current status lives in a
//! [`TaskStore`] next to an append-only log of [`TaskEvent`]s; all writes go
//! through the [`TaskStateMachine`], which enforces the lifecycle rules and fans
//! events out to live subscribers.

pub mod in_memory;
pub mod state_machine;

pub use in_memory::InMemoryTaskStore;
pub use state_machine::{TaskStateMachine, TaskSubscription};

use crate::errors::RelayResult;
use crate::runtime::core::status_mapper::is_terminal_state;
use a2a_types::{Message, TaskStatus, TaskStatusUpdateEvent};

/// Current state of one tracked unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
}

impl Task {
    pub const fn is_terminal(&self) -> bool {
        is_terminal_state(&self.status.state)
    }

    /// Protocol view of the task with the given conversation history.
    pub fn to_a2a(&self, history: Vec<Message>) -> a2a_types::Task {
        a2a_types::Task {
            kind: a2a_types::TASK_KIND.to_string(),
            id: self.id.clone(),
            context_id: self.context_id.clone(),
            status: self.status.clone(),
            history,
            metadata: None,
        }
    }
}

/// Entries of a task's event log.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A user turn that started or continued the task.
    Message(Message),
    /// A status change, including the final one.
    StatusUpdate(TaskStatusUpdateEvent),
    /// The upstream failed; the task keeps its last status.
    UpstreamError {
        task_id: String,
        context_id: String,
        message: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Message(message) => message.task_id.as_deref(),
            Self::StatusUpdate(update) => Some(&update.task_id),
            Self::UpstreamError { task_id, .. } => Some(task_id),
        }
    }

    /// True for the status update that moved the task into a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::StatusUpdate(update) if update.is_final)
    }
}

/// A logged event together with its position in the task's log.
///
/// Sequence numbers start at 1 and increase by one per appended event.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub event: TaskEvent,
}

/// Storage for tasks and their event logs.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    /// Retrieves a single task by its ID.
    async fn get_task(&self, task_id: &str) -> RelayResult<Option<Task>>;

    /// Stores a new task; fails with `TaskAlreadyExists` if the id is taken.
    async fn insert_task(&self, task: &Task) -> RelayResult<()>;

    /// Replaces the stored state of an existing task.
    async fn save_task(&self, task: &Task) -> RelayResult<()>;

    /// Appends an event to a task's log and returns its sequence number.
    async fn add_task_event(&self, task_id: &str, event: &TaskEvent) -> RelayResult<u64>;

    /// Retrieves all events for a task, in append order.
    async fn get_task_events(&self, task_id: &str) -> RelayResult<Vec<SequencedEvent>>;

    /// Lists the ids of all stored tasks.
    async fn list_task_ids(&self) -> RelayResult<Vec<String>>;
}

/// Rebuilds the conversation of a task from its log.
///
/// User turns are taken as-is, agent turns from the messages of status updates.
pub fn history_from_events(events: &[SequencedEvent]) -> Vec<Message> {
    events
        .iter()
        .filter_map(|entry| match &entry.event {
            TaskEvent::Message(message) => Some(message.clone()),
            TaskEvent::StatusUpdate(update) => update.status.message.clone(),
            TaskEvent::UpstreamError { .. } => None,
        })
        .collect()
}

/// The most recent upstream error, if nothing was logged after it.
///
/// A task whose log ends with an error has stalled: its run is over but it never
/// reached a terminal state.
pub fn trailing_upstream_error(events: &[SequencedEvent]) -> Option<String> {
    match events.last().map(|entry| &entry.event) {
        Some(TaskEvent::UpstreamError { message, .. }) => Some(message.clone()),
        _ => None,
    }
}
