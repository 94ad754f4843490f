//! Maps raw execution events to client-visible status updates.
//!
//! Translation is a pure function: it never touches task state and never stamps
//! time. The state machine applies the result and records the timestamp.

use crate::events::ExecutionEvent;
use a2a_types::TaskState;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix of the update emitted when a sub-task starts.
pub const SUBTASK_CALLED_PREFIX: &str = "SUBAGENT CALLED: ";

/// Text of the update emitted when a sub-task returns.
pub const SUBTASK_RETURNED_TEXT: &str = "SUBAGENT RETURNED";

/// What a status update carries, which decides how sinks render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    /// Sub-task bookkeeping (started, returned).
    Progress,
    /// Model output meant for the user.
    Content,
}

impl UpdateKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Content => "content",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "progress" => Some(Self::Progress),
            "content" => Some(Self::Content),
            _ => None,
        }
    }
}

/// Identity every update of one run is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    pub task_id: String,
    pub context_id: String,
    pub request_id: String,
}

/// A translated, not yet applied, status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub task_id: String,
    pub context_id: String,
    pub request_id: String,
    pub state: TaskState,
    pub text: String,
    pub kind: UpdateKind,
}

impl StatusUpdate {
    fn working(target: &UpdateTarget, text: String, kind: UpdateKind) -> Self {
        Self {
            task_id: target.task_id.clone(),
            context_id: target.context_id.clone(),
            request_id: target.request_id.clone(),
            state: TaskState::Working,
            text,
            kind,
        }
    }
}

/// Translates one execution event into at most one status update.
///
/// - `SubtaskStart(name)` → `"SUBAGENT CALLED: {name}"` (progress)
/// - `SubtaskEnd(_)` → `"SUBAGENT RETURNED"` (progress; the name is not repeated)
/// - `ModelOutput(text)` → `text` verbatim (content), nothing when `text` is empty
/// - anything else → nothing
#[must_use]
pub fn translate(event: &ExecutionEvent, target: &UpdateTarget) -> Option<StatusUpdate> {
    match event {
        ExecutionEvent::SubtaskStart { name } => Some(StatusUpdate::working(
            target,
            format!("{SUBTASK_CALLED_PREFIX}{name}"),
            UpdateKind::Progress,
        )),
        ExecutionEvent::SubtaskEnd { .. } => Some(StatusUpdate::working(
            target,
            SUBTASK_RETURNED_TEXT.to_string(),
            UpdateKind::Progress,
        )),
        ExecutionEvent::ModelOutput { text } if text.is_empty() => {
            debug!(task_id = %target.task_id, "model output empty, no update emitted");
            None
        }
        ExecutionEvent::ModelOutput { text } => Some(StatusUpdate::working(
            target,
            text.clone(),
            UpdateKind::Content,
        )),
        ExecutionEvent::Unknown => {
            debug!(task_id = %target.task_id, "ignoring unrecognized execution event");
            None
        }
    }
}
