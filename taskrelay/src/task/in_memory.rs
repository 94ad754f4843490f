//! In-memory implementation of the [`TaskStore`] trait.
//!
//! Nothing outlives the process; this is the only store the relay ships with.

use crate::errors::{RelayError, RelayResult};
use crate::task::{SequencedEvent, Task, TaskEvent, TaskStore};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// An in-memory, thread-safe implementation of the [`TaskStore`].
///
/// Uses `DashMap` for concurrent access, so readers never wait on writers of
/// other tasks.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskStore {
    tasks: Arc<DashMap<String, Task>>,
    events: Arc<DashMap<String, Vec<SequencedEvent>>>,
}

impl InMemoryTaskStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(task_id: &str) -> RelayError {
        RelayError::TaskNotFound {
            task_id: task_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get_task(&self, task_id: &str) -> RelayResult<Option<Task>> {
        Ok(self.tasks.get(task_id).map(|t| t.value().clone()))
    }

    async fn insert_task(&self, task: &Task) -> RelayResult<()> {
        match self.tasks.entry(task.id.clone()) {
            Entry::Occupied(_) => Err(RelayError::TaskAlreadyExists {
                task_id: task.id.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                Ok(())
            }
        }
    }

    async fn save_task(&self, task: &Task) -> RelayResult<()> {
        match self.tasks.get_mut(&task.id) {
            Some(mut stored) => {
                *stored = task.clone();
                Ok(())
            }
            None => Err(Self::not_found(&task.id)),
        }
    }

    async fn add_task_event(&self, task_id: &str, event: &TaskEvent) -> RelayResult<u64> {
        if !self.tasks.contains_key(task_id) {
            return Err(Self::not_found(task_id));
        }

        let mut log = self.events.entry(task_id.to_string()).or_default();
        let sequence = log.len() as u64 + 1;
        log.push(SequencedEvent {
            sequence,
            event: event.clone(),
        });
        Ok(sequence)
    }

    async fn get_task_events(&self, task_id: &str) -> RelayResult<Vec<SequencedEvent>> {
        Ok(self
            .events
            .get(task_id)
            .map_or_else(Vec::new, |v| v.value().clone()))
    }

    async fn list_task_ids(&self) -> RelayResult<Vec<String>> {
        Ok(self.tasks.iter().map(|item| item.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::core::status_mapper::submitted_status;
    use a2a_types::{Message, MessageRole, TaskState};

    fn task(id: &str) -> Task {
        Task {
            id: id.into(),
            context_id: "ctx".into(),
            status: submitted_status(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = InMemoryTaskStore::new();
        store.insert_task(&task("t1")).await.unwrap();
        let err = store.insert_task(&task("t1")).await.unwrap_err();
        assert!(matches!(err, RelayError::TaskAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn save_requires_existing_task() {
        let store = InMemoryTaskStore::new();
        let err = store.save_task(&task("missing")).await.unwrap_err();
        assert!(matches!(err, RelayError::TaskNotFound { .. }));

        store.insert_task(&task("t1")).await.unwrap();
        let mut updated = task("t1");
        updated.status.state = TaskState::Working;
        store.save_task(&updated).await.unwrap();
        let stored = store.get_task("t1").await.unwrap().expect("task");
        assert_eq!(stored.status.state, TaskState::Working);
    }

    #[tokio::test]
    async fn events_are_sequenced_per_task() {
        let store = InMemoryTaskStore::new();
        store.insert_task(&task("t1")).await.unwrap();
        store.insert_task(&task("t2")).await.unwrap();

        let message = TaskEvent::Message(Message::text(MessageRole::User, "m", "hi"));
        assert_eq!(store.add_task_event("t1", &message).await.unwrap(), 1);
        assert_eq!(store.add_task_event("t1", &message).await.unwrap(), 2);
        assert_eq!(store.add_task_event("t2", &message).await.unwrap(), 1);

        let events = store.get_task_events("t1").await.unwrap();
        assert_eq!(
            events.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(store.add_task_event("nope", &message).await.is_err());

        let mut ids = store.list_task_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["t1".to_string(), "t2".to_string()]);
    }
}
