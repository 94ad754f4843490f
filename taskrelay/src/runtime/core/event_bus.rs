//! Per-task fan-out for task events.
//!
//! The event bus allows multiple subscribers (SSE streams, blocking sends) to receive
//! updates for a given task while the task store remains the source of truth.

use crate::task::SequencedEvent;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receiver for a task's event stream.
pub type TaskEventReceiver = UnboundedReceiver<SequencedEvent>;

type TaskId = String;

#[derive(Default)]
struct Subscribers {
    senders: Vec<UnboundedSender<SequencedEvent>>,
}

impl Subscribers {
    fn add(&mut self, sender: UnboundedSender<SequencedEvent>) {
        self.senders.push(sender);
    }

    fn broadcast(&mut self, event: &SequencedEvent) {
        self.senders
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

/// Multiplexes [`SequencedEvent`]s to subscribers per task.
#[derive(Default)]
pub struct TaskEventBus {
    inner: DashMap<TaskId, Subscribers>,
}

impl TaskEventBus {
    /// Creates a new, empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to events for the provided task identifier.
    #[must_use]
    pub fn subscribe(&self, task_id: &str) -> TaskEventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.entry(task_id.to_string()).or_default().add(tx);
        rx
    }

    /// Publishes an event to all subscribers interested in the task.
    pub fn publish(&self, event: &SequencedEvent) {
        let Some(task_id) = event.event.task_id() else {
            return;
        };

        if let Some(mut entry) = self.inner.get_mut(task_id) {
            entry.broadcast(event);
            if entry.is_empty() {
                drop(entry);
                self.inner.remove_if(task_id, |_, subs| subs.is_empty());
            }
        }
    }

    /// Drops every subscriber of a task, ending their streams.
    pub fn close(&self, task_id: &str) {
        self.inner.remove(task_id);
    }

    /// Number of live subscribers for a task.
    #[must_use]
    pub fn subscriber_count(&self, task_id: &str) -> usize {
        self.inner.get(task_id).map_or(0, |subs| subs.senders.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::core::status_mapper::{create_status_update_event, submitted_status};
    use crate::task::TaskEvent;

    fn status_event(task_id: &str, sequence: u64) -> SequencedEvent {
        SequencedEvent {
            sequence,
            event: TaskEvent::StatusUpdate(create_status_update_event(
                task_id,
                "ctx",
                submitted_status(),
                false,
            )),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn publishes_events_to_subscribers() {
        let bus = TaskEventBus::new();
        let mut rx = bus.subscribe("task-123");
        let mut other = bus.subscribe("task-456");

        bus.publish(&status_event("task-123", 1));

        let received = rx.recv().await.expect("event");
        assert_eq!(received.sequence, 1);
        assert_eq!(received.event.task_id(), Some("task-123"));
        assert!(other.try_recv().is_err());

        drop(rx);
        // publishing after subscriber drop should not panic
        bus.publish(&status_event("task-123", 2));
        assert_eq!(bus.subscriber_count("task-123"), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn close_ends_subscriber_streams() {
        let bus = TaskEventBus::new();
        let mut rx = bus.subscribe("task-1");
        bus.close("task-1");
        assert!(rx.recv().await.is_none());
    }
}
