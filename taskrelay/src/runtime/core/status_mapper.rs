//! Status mapping utilities between relay updates and A2A protocol types.
//!
//! This module centralizes the conversions between the translator's [`StatusUpdate`]
//! and the A2A task status types, including the metadata keys that carry relay-specific
//! information (`requestId`, `updateKind`) across the protocol boundary.

use crate::translator::{StatusUpdate, UpdateKind};
use a2a_types::{Message, MessageRole, TaskState, TaskStatus, TaskStatusUpdateEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;

/// Metadata key holding the id of the client request that produced an update.
pub const REQUEST_ID_METADATA_KEY: &str = "requestId";

/// Metadata key holding the [`UpdateKind`] of an update.
pub const UPDATE_KIND_METADATA_KEY: &str = "updateKind";

/// Creates a `TaskStatus` representing the Submitted state.
#[must_use]
pub fn submitted_status() -> TaskStatus {
    TaskStatus {
        state: TaskState::Submitted,
        timestamp: Some(now()),
        message: None,
    }
}

/// Builds the status recorded when `update` is applied.
///
/// The update text becomes a single-part agent message; updates without text
/// carry no message at all.
#[must_use]
pub fn status_from_update(update: &StatusUpdate, message_id: String) -> TaskStatus {
    let message = (!update.text.is_empty()).then(|| Message {
        context_id: Some(update.context_id.clone()),
        task_id: Some(update.task_id.clone()),
        ..Message::text(MessageRole::Agent, message_id, update.text.clone())
    });

    TaskStatus {
        state: update.state,
        timestamp: Some(now()),
        message,
    }
}

/// Creates a terminal `TaskStatus` for `state`.
#[must_use]
pub fn terminal_status(state: TaskState) -> TaskStatus {
    TaskStatus {
        state,
        timestamp: Some(now()),
        message: None,
    }
}

/// Creates a `TaskStatusUpdateEvent` from a task status.
///
/// # Arguments
/// * `task_id` - The unique identifier of the task
/// * `context_id` - The context identifier grouping related tasks
/// * `status` - The new status of the task
/// * `is_final` - Whether this is a terminal state change
#[must_use]
pub fn create_status_update_event(
    task_id: &str,
    context_id: &str,
    status: TaskStatus,
    is_final: bool,
) -> TaskStatusUpdateEvent {
    TaskStatusUpdateEvent {
        kind: a2a_types::STATUS_UPDATE_KIND.to_string(),
        task_id: task_id.to_string(),
        context_id: context_id.to_string(),
        status,
        is_final,
        metadata: None,
    }
}

/// Attaches the request id and update kind to an outgoing event.
#[must_use]
pub fn with_update_metadata(
    mut event: TaskStatusUpdateEvent,
    request_id: &str,
    kind: UpdateKind,
) -> TaskStatusUpdateEvent {
    let metadata = event.metadata.get_or_insert_with(HashMap::new);
    metadata.insert(
        REQUEST_ID_METADATA_KEY.to_string(),
        serde_json::Value::String(request_id.to_string()),
    );
    metadata.insert(
        UPDATE_KIND_METADATA_KEY.to_string(),
        serde_json::Value::String(kind.as_str().to_string()),
    );
    event
}

/// Reads the update kind of an event.
///
/// Events from agents that do not tag their updates are treated as content when
/// they carry text and as progress otherwise.
#[must_use]
pub fn update_kind(event: &TaskStatusUpdateEvent) -> UpdateKind {
    event
        .metadata
        .as_ref()
        .and_then(|m| m.get(UPDATE_KIND_METADATA_KEY))
        .and_then(serde_json::Value::as_str)
        .and_then(UpdateKind::parse)
        .unwrap_or_else(|| {
            if status_text(&event.status).is_empty() {
                UpdateKind::Progress
            } else {
                UpdateKind::Content
            }
        })
}

/// Reads the originating request id of an event, if recorded.
#[must_use]
pub fn request_id(event: &TaskStatusUpdateEvent) -> Option<&str> {
    event
        .metadata
        .as_ref()
        .and_then(|m| m.get(REQUEST_ID_METADATA_KEY))
        .and_then(serde_json::Value::as_str)
}

/// Text of a status message, or `""` when the status has none.
#[must_use]
pub fn status_text(status: &TaskStatus) -> String {
    status
        .message
        .as_ref()
        .map(Message::text_content)
        .unwrap_or_default()
}

/// Checks if a `TaskState` is terminal (cannot transition further).
///
/// `InputRequired` and `AuthRequired` are NOT terminal; they can move on once the
/// client provides what is missing.
#[must_use]
pub const fn is_terminal_state(state: &TaskState) -> bool {
    matches!(
        state,
        TaskState::Completed | TaskState::Failed | TaskState::Canceled | TaskState::Rejected
    )
}

/// Returns the current UTC time as an RFC 3339 timestamp with microseconds and `Z`.
#[must_use]
pub fn now() -> String {
    format_timestamp(Utc::now())
}

/// Formats a UTC instant the way every relay timestamp is written.
#[must_use]
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: &str, kind: UpdateKind) -> StatusUpdate {
        StatusUpdate {
            task_id: "task-1".into(),
            context_id: "ctx-1".into(),
            request_id: "req-1".into(),
            state: TaskState::Working,
            text: text.into(),
            kind,
        }
    }

    #[test]
    fn status_from_update_wraps_text_in_agent_message() {
        let status = status_from_update(&update("hello", UpdateKind::Content), "m1".into());
        assert_eq!(status.state, TaskState::Working);
        let message = status.message.as_ref().expect("message");
        assert_eq!(message.role, MessageRole::Agent);
        assert_eq!(message.task_id.as_deref(), Some("task-1"));
        assert_eq!(status_text(&status), "hello");
    }

    #[test]
    fn empty_update_has_no_message() {
        let status = status_from_update(&update("", UpdateKind::Progress), "m1".into());
        assert!(status.message.is_none());
        assert_eq!(status_text(&status), "");
    }

    #[test]
    fn metadata_round_trips_kind_and_request_id() {
        let event = create_status_update_event("task-1", "ctx-1", submitted_status(), false);
        let event = with_update_metadata(event, "req-9", UpdateKind::Progress);
        assert_eq!(update_kind(&event), UpdateKind::Progress);
        assert_eq!(request_id(&event), Some("req-9"));
    }

    #[test]
    fn untagged_events_infer_kind_from_text() {
        let status = status_from_update(&update("text", UpdateKind::Progress), "m1".into());
        let with_text = create_status_update_event("t", "c", status, false);
        assert_eq!(update_kind(&with_text), UpdateKind::Content);

        let without_text = create_status_update_event("t", "c", submitted_status(), false);
        assert_eq!(update_kind(&without_text), UpdateKind::Progress);
    }

    #[test]
    fn terminal_states() {
        assert!(is_terminal_state(&TaskState::Completed));
        assert!(is_terminal_state(&TaskState::Canceled));
        assert!(is_terminal_state(&TaskState::Failed));
        assert!(!is_terminal_state(&TaskState::Working));
        assert!(!is_terminal_state(&TaskState::Submitted));
        assert!(!is_terminal_state(&TaskState::InputRequired));
    }

    #[test]
    fn timestamps_use_zulu_suffix_with_microseconds() {
        let ts = now();
        assert!(ts.ends_with('Z'), "{ts}");
        let fraction = ts.rsplit('.').next().expect("fraction");
        assert_eq!(fraction.len(), "123456Z".len(), "{ts}");
    }
}
