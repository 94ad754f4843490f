//! Helpers for translating relay errors into JSON-RPC error payloads.

use crate::errors::RelayError;
use a2a_types::JSONRPCError;
use serde_json::json;

/// Map a [`RelayError`] into an A2A-compliant [`JSONRPCError`].
///
/// This keeps protocol wiring outside of the executor so that execution logic
/// only deals with domain errors.
#[must_use]
pub fn to_jsonrpc_error(error: RelayError) -> JSONRPCError {
    match error {
        RelayError::InvalidInput(message) => JSONRPCError::invalid_params().with_message(message),
        RelayError::TaskNotFound { task_id } => JSONRPCError::task_not_found()
            .with_message(format!("Task not found: {task_id}"))
            .with_data(json!({ "taskId": task_id })),
        RelayError::InvalidTransition { task_id, from, to } => JSONRPCError::invalid_request()
            .with_message(format!("Task {task_id} cannot move from {from} to {to}"))
            .with_data(json!({ "taskId": task_id, "state": from })),
        RelayError::UpstreamUnavailable { reason } | RelayError::UpstreamFailure { reason } => {
            JSONRPCError::internal()
                .with_message(reason.clone())
                .with_data(json!({ "upstream": true, "details": reason }))
        }
        other => JSONRPCError::internal().with_data(json!({
            "details": other.to_string(),
        })),
    }
}

/// Error returned when `tasks/cancel` targets a task that already finished.
#[must_use]
pub fn task_not_cancelable_error(task_id: &str, state: a2a_types::TaskState) -> JSONRPCError {
    JSONRPCError::task_not_cancelable()
        .with_message(format!("Task {task_id} is already {state}"))
        .with_data(json!({ "taskId": task_id, "state": state }))
}

/// Error returned for request bodies that are not valid A2A requests.
#[must_use]
pub fn invalid_request_error(details: impl Into<String>) -> JSONRPCError {
    JSONRPCError::invalid_request().with_data(json!({ "details": details.into() }))
}
