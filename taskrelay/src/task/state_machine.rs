//! Lifecycle rules for tasks.
//!
//! `submitted → working → completed | canceled`, with exactly one terminal
//! transition per task. Every write to a task takes that task's writer lock, so the
//! stored status, the log sequence and the publish order on the bus always agree.

use crate::errors::{RelayError, RelayResult};
use crate::runtime::core::event_bus::{TaskEventBus, TaskEventReceiver};
use crate::runtime::core::status_mapper::{
    create_status_update_event, is_terminal_state, status_from_update, submitted_status,
    terminal_status, with_update_metadata,
};
use crate::task::{trailing_upstream_error, SequencedEvent, Task, TaskEvent, TaskStore};
use crate::translator::StatusUpdate;
use a2a_types::{Message, TaskState, TaskStatusUpdateEvent};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A live view of one task.
///
/// `snapshot` is the state at subscription time; `receiver` yields every event
/// logged after it (sequence greater than `baseline`). `stalled` holds the upstream
/// error that ended the task's run when the task will not progress any further.
#[derive(Debug)]
pub struct TaskSubscription {
    pub snapshot: Task,
    pub baseline: u64,
    pub stalled: Option<String>,
    pub receiver: TaskEventReceiver,
}

/// Owns every state change of every task.
pub struct TaskStateMachine {
    store: Arc<dyn TaskStore>,
    bus: Arc<TaskEventBus>,
    writers: DashMap<String, Arc<Mutex<()>>>,
}

impl TaskStateMachine {
    pub fn new(store: Arc<dyn TaskStore>, bus: Arc<TaskEventBus>) -> Self {
        Self {
            store,
            bus,
            writers: DashMap::new(),
        }
    }

    /// Writer lock of a task.
    ///
    /// Locks exist from creation until the task is sealed. A sealed task is
    /// immutable, so a throwaway lock is enough to read it and reject the write.
    async fn writer(&self, task_id: &str) -> RelayResult<Arc<Mutex<()>>> {
        if let Some(writer) = self.writers.get(task_id) {
            return Ok(writer.clone());
        }
        self.load(task_id).await?;
        Ok(Arc::new(Mutex::new(())))
    }

    async fn load(&self, task_id: &str) -> RelayResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| RelayError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }

    async fn append(&self, task_id: &str, event: TaskEvent) -> RelayResult<u64> {
        let sequence = self.store.add_task_event(task_id, &event).await?;
        self.bus.publish(&SequencedEvent { sequence, event });
        Ok(sequence)
    }

    /// Creates a task in `submitted` for an initial user message.
    ///
    /// The context id is taken from the message when present. The stored copy of
    /// the message is stamped with the new task and context ids.
    pub async fn create(&self, initial_message: Message) -> RelayResult<Task> {
        let task_id = Uuid::new_v4().to_string();
        let context_id = initial_message
            .context_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let task = Task {
            id: task_id.clone(),
            context_id: context_id.clone(),
            status: submitted_status(),
        };
        self.writers
            .insert(task_id.clone(), Arc::new(Mutex::new(())));
        if let Err(err) = self.store.insert_task(&task).await {
            self.writers.remove(&task_id);
            return Err(err);
        }

        let message = Message {
            task_id: Some(task_id.clone()),
            context_id: Some(context_id.clone()),
            ..initial_message
        };
        self.append(&task_id, TaskEvent::Message(message)).await?;

        info!(task_id = %task_id, context_id = %context_id, "task created");
        Ok(task)
    }

    /// Applies a translated update.
    ///
    /// Fails with `InvalidTransition` once the task is terminal.
    pub async fn apply_update(&self, update: StatusUpdate) -> RelayResult<TaskStatusUpdateEvent> {
        let writer = self.writer(&update.task_id).await?;
        let _guard = writer.lock().await;

        let mut task = self.load(&update.task_id).await?;
        ensure_open(&task, update.state)?;

        let status = status_from_update(&update, Uuid::new_v4().to_string());
        let is_final = is_terminal_state(&status.state);
        let event = with_update_metadata(
            create_status_update_event(&task.id, &task.context_id, status.clone(), is_final),
            &update.request_id,
            update.kind,
        );

        task.status = status;
        self.store.save_task(&task).await?;
        self.append(&task.id, TaskEvent::StatusUpdate(event.clone()))
            .await?;

        if is_final {
            self.seal(&task.id);
        }
        debug!(task_id = %task.id, state = %task.status.state, "status update applied");
        Ok(event)
    }

    /// Moves the task to `completed`. Not idempotent.
    pub async fn complete(&self, task_id: &str) -> RelayResult<TaskStatusUpdateEvent> {
        self.finish(task_id, TaskState::Completed).await
    }

    /// Moves the task to `canceled`. Not idempotent.
    pub async fn cancel(&self, task_id: &str) -> RelayResult<TaskStatusUpdateEvent> {
        self.finish(task_id, TaskState::Canceled).await
    }

    async fn finish(&self, task_id: &str, state: TaskState) -> RelayResult<TaskStatusUpdateEvent> {
        let writer = self.writer(task_id).await?;
        let _guard = writer.lock().await;

        let mut task = self.load(task_id).await?;
        ensure_open(&task, state)?;

        let status = terminal_status(state);
        let event = create_status_update_event(&task.id, &task.context_id, status.clone(), true);

        task.status = status;
        self.store.save_task(&task).await?;
        self.append(task_id, TaskEvent::StatusUpdate(event.clone()))
            .await?;
        self.seal(task_id);

        info!(task_id = %task_id, state = %state, "task finished");
        Ok(event)
    }

    /// Records an upstream failure without changing the task's state.
    pub async fn record_upstream_error(&self, task_id: &str, message: &str) -> RelayResult<()> {
        let writer = self.writer(task_id).await?;
        let _guard = writer.lock().await;

        let task = self.load(task_id).await?;
        ensure_open(&task, task.status.state)?;

        warn!(task_id = %task_id, error = %message, "upstream failed, task left in {}", task.status.state);
        self.append(
            task_id,
            TaskEvent::UpstreamError {
                task_id: task.id.clone(),
                context_id: task.context_id.clone(),
                message: message.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    /// Current state of a task.
    pub async fn snapshot(&self, task_id: &str) -> RelayResult<Task> {
        self.load(task_id).await
    }

    /// The task's event log, in order.
    pub async fn events(&self, task_id: &str) -> RelayResult<Vec<SequencedEvent>> {
        self.load(task_id).await?;
        self.store.get_task_events(task_id).await
    }

    /// Ids of every known task.
    pub async fn task_ids(&self) -> RelayResult<Vec<String>> {
        self.store.list_task_ids().await
    }

    /// Subscribes to a task.
    ///
    /// Taken under the writer lock, so the snapshot and the first received event
    /// are adjacent: nothing is missed and nothing is delivered twice.
    pub async fn subscribe(&self, task_id: &str) -> RelayResult<TaskSubscription> {
        let writer = self.writer(task_id).await?;
        let _guard = writer.lock().await;

        let snapshot = self.load(task_id).await?;
        let events = self.store.get_task_events(task_id).await?;
        let baseline = events.last().map_or(0, |e| e.sequence);
        let stalled = if snapshot.is_terminal() {
            None
        } else {
            trailing_upstream_error(&events)
        };
        let receiver = if snapshot.is_terminal() {
            // Sealed tasks publish nothing more; hand out an already-closed channel
            let (_, receiver) = tokio::sync::mpsc::unbounded_channel();
            receiver
        } else {
            self.bus.subscribe(task_id)
        };

        Ok(TaskSubscription {
            snapshot,
            baseline,
            stalled,
            receiver,
        })
    }

    /// Releases per-task resources once the task is terminal.
    fn seal(&self, task_id: &str) {
        self.bus.close(task_id);
        self.writers.remove(task_id);
    }
}

fn ensure_open(task: &Task, to: TaskState) -> RelayResult<()> {
    if task.is_terminal() {
        return Err(RelayError::InvalidTransition {
            task_id: task.id.clone(),
            from: task.status.state,
            to,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::InMemoryTaskStore;
    use crate::translator::UpdateKind;
    use a2a_types::MessageRole;

    fn machine() -> TaskStateMachine {
        TaskStateMachine::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(TaskEventBus::new()),
        )
    }

    fn user_message(text: &str) -> Message {
        Message::text(MessageRole::User, Uuid::new_v4().to_string(), text)
    }

    fn update(task: &Task, text: &str) -> StatusUpdate {
        StatusUpdate {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            request_id: "req-1".into(),
            state: TaskState::Working,
            text: text.into(),
            kind: UpdateKind::Content,
        }
    }

    #[tokio::test]
    async fn create_starts_in_submitted_and_logs_the_message() {
        let machine = machine();
        let mut message = user_message("hello");
        message.context_id = Some("ctx-given".into());

        let task = machine.create(message).await.unwrap();
        assert_eq!(task.status.state, TaskState::Submitted);
        assert_eq!(task.context_id, "ctx-given");

        let events = machine.events(&task.id).await.unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].event {
            TaskEvent::Message(m) => assert_eq!(m.task_id.as_deref(), Some(task.id.as_str())),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn updates_move_task_to_working() {
        let machine = machine();
        let task = machine.create(user_message("q")).await.unwrap();

        let event = machine.apply_update(update(&task, "partial")).await.unwrap();
        assert!(!event.is_final);
        assert_eq!(event.status.state, TaskState::Working);

        let snapshot = machine.snapshot(&task.id).await.unwrap();
        assert_eq!(snapshot.status.state, TaskState::Working);
    }

    #[tokio::test]
    async fn no_update_is_accepted_after_terminal_state() {
        let machine = machine();
        let task = machine.create(user_message("q")).await.unwrap();
        let done = machine.complete(&task.id).await.unwrap();
        assert!(done.is_final);

        let err = machine.apply_update(update(&task, "late")).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidTransition {
                from: TaskState::Completed,
                to: TaskState::Working,
                ..
            }
        ));
        assert!(matches!(
            machine.complete(&task.id).await,
            Err(RelayError::InvalidTransition { .. })
        ));
        assert!(matches!(
            machine.cancel(&task.id).await,
            Err(RelayError::InvalidTransition { .. })
        ));
        assert!(matches!(
            machine.record_upstream_error(&task.id, "late").await,
            Err(RelayError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn upstream_error_keeps_state_and_marks_task_stalled() {
        let machine = machine();
        let task = machine.create(user_message("q")).await.unwrap();
        machine.apply_update(update(&task, "partial")).await.unwrap();
        machine
            .record_upstream_error(&task.id, "connection reset")
            .await
            .unwrap();

        let subscription = machine.subscribe(&task.id).await.unwrap();
        assert_eq!(subscription.snapshot.status.state, TaskState::Working);
        assert_eq!(subscription.stalled.as_deref(), Some("connection reset"));
        assert_eq!(subscription.baseline, 3);
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order_and_end_after_terminal() {
        let machine = machine();
        let task = machine.create(user_message("q")).await.unwrap();
        let mut subscription = machine.subscribe(&task.id).await.unwrap();
        assert_eq!(subscription.baseline, 1);

        machine.apply_update(update(&task, "one")).await.unwrap();
        machine.apply_update(update(&task, "two")).await.unwrap();
        machine.complete(&task.id).await.unwrap();

        let mut sequences = Vec::new();
        while let Some(event) = subscription.receiver.recv().await {
            sequences.push((event.sequence, event.event.is_final()));
        }
        assert_eq!(sequences, vec![(2, false), (3, false), (4, true)]);
    }

    #[tokio::test]
    async fn concurrent_terminal_transitions_yield_exactly_one_winner() {
        let machine = Arc::new(machine());
        let task = machine.create(user_message("q")).await.unwrap();

        let complete = {
            let machine = machine.clone();
            let id = task.id.clone();
            tokio::spawn(async move { machine.complete(&id).await })
        };
        let cancel = {
            let machine = machine.clone();
            let id = task.id.clone();
            tokio::spawn(async move { machine.cancel(&id).await })
        };

        let results = [complete.await.unwrap(), cancel.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

        let finals = machine
            .events(&task.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event.is_final())
            .count();
        assert_eq!(finals, 1);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let machine = machine();
        assert!(matches!(
            machine.snapshot("missing").await,
            Err(RelayError::TaskNotFound { .. })
        ));
        assert!(matches!(
            machine.subscribe("missing").await,
            Err(RelayError::TaskNotFound { .. })
        ));
    }
}
