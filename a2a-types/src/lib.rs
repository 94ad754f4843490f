//! # A2A (Agent2Agent) Protocol Types
//!
//! Rust data structures for the subset of the Agent2Agent (A2A) protocol spoken by the
//! task relay: JSON-RPC envelopes, tasks and their status, messages, status-update events,
//! and the request/response shapes of the task methods (`message/send`, `message/stream`,
//! `tasks/get`, `tasks/cancel`, `tasks/resubscribe`).
//!
//! All types are designed for serialization and deserialization with `serde` and follow
//! the camelCase wire names of the protocol.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// JSON-RPC 2.0 Base Types
// ============================================================================

/// JSON-RPC request id: string, integer or `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JSONRPCId {
    String(String),
    Integer(i64),
    Null,
}

/// A JSON-RPC response carrying an error instead of a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCErrorResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    pub error: JSONRPCError,
    /// Echoes the request id; `None` when the request could not be parsed.
    pub id: Option<JSONRPCId>,
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JSONRPCError {
    /// Standard JSON-RPC or A2A-specific error code.
    pub code: i32,
    pub message: String,
    /// Extra details, free-form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JSONRPCError {
    fn with_defaults(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    /// The server received invalid JSON (-32700).
    pub fn json_parse() -> Self {
        Self::with_defaults(JSON_PARSE_ERROR_CODE, JSON_PARSE_ERROR_MESSAGE)
    }

    /// The JSON sent is not a valid Request object (-32600).
    pub fn invalid_request() -> Self {
        Self::with_defaults(INVALID_REQUEST_ERROR_CODE, INVALID_REQUEST_ERROR_MESSAGE)
    }

    /// The requested method does not exist or is not available (-32601).
    pub fn method_not_found() -> Self {
        Self::with_defaults(METHOD_NOT_FOUND_ERROR_CODE, METHOD_NOT_FOUND_ERROR_MESSAGE)
    }

    /// The method parameters are invalid (-32602).
    pub fn invalid_params() -> Self {
        Self::with_defaults(INVALID_PARAMS_ERROR_CODE, INVALID_PARAMS_ERROR_MESSAGE)
    }

    /// An internal error on the server (-32603).
    pub fn internal() -> Self {
        Self::with_defaults(INTERNAL_ERROR_CODE, INTERNAL_ERROR_MESSAGE)
    }

    /// The requested task ID was not found (-32001).
    pub fn task_not_found() -> Self {
        Self::with_defaults(TASK_NOT_FOUND_ERROR_CODE, TASK_NOT_FOUND_ERROR_MESSAGE)
    }

    /// The task is in a state where it cannot be canceled (-32002).
    pub fn task_not_cancelable() -> Self {
        Self::with_defaults(
            TASK_NOT_CANCELABLE_ERROR_CODE,
            TASK_NOT_CANCELABLE_ERROR_MESSAGE,
        )
    }

    /// Replaces the default message, keeping the code.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

// Error code and message constants
pub const JSON_PARSE_ERROR_CODE: i32 = -32700;
const JSON_PARSE_ERROR_MESSAGE: &str = "Invalid JSON payload";
pub const INVALID_REQUEST_ERROR_CODE: i32 = -32600;
const INVALID_REQUEST_ERROR_MESSAGE: &str = "Request payload validation error";
pub const METHOD_NOT_FOUND_ERROR_CODE: i32 = -32601;
const METHOD_NOT_FOUND_ERROR_MESSAGE: &str = "Method not found";
pub const INVALID_PARAMS_ERROR_CODE: i32 = -32602;
const INVALID_PARAMS_ERROR_MESSAGE: &str = "Invalid parameters";
pub const INTERNAL_ERROR_CODE: i32 = -32603;
const INTERNAL_ERROR_MESSAGE: &str = "Internal error";
pub const TASK_NOT_FOUND_ERROR_CODE: i32 = -32001;
const TASK_NOT_FOUND_ERROR_MESSAGE: &str = "Task not found";
pub const TASK_NOT_CANCELABLE_ERROR_CODE: i32 = -32002;
const TASK_NOT_CANCELABLE_ERROR_MESSAGE: &str = "Task cannot be canceled";

// ============================================================================
// A2A Core Protocol Types
// ============================================================================

/// Lifecycle state of a task, serialized in kebab-case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Accepted, not started yet.
    Submitted,
    Working,
    /// Waiting for the client to provide more input.
    InputRequired,
    /// Finished successfully. Terminal.
    Completed,
    /// Stopped on request. Terminal.
    Canceled,
    /// Ended with an error. Terminal.
    Failed,
    /// Refused before starting. Terminal.
    Rejected,
    /// Waiting for the client to authenticate.
    AuthRequired,
    /// Reported by agents that cannot tell.
    Unknown,
}

impl TaskState {
    /// Wire name of the state, as it appears in JSON.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Canceled => "canceled",
            TaskState::Failed => "failed",
            TaskState::Rejected => "rejected",
            TaskState::AuthRequired => "auth-required",
            TaskState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task's state at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatus {
    pub state: TaskState,
    /// RFC 3339 time the status was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Agent message explaining the status, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// A unit of work tracked by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Discriminator, always `"task"`.
    #[serde(default = "default_task_kind")]
    pub kind: String,
    /// Server-generated task id.
    pub id: String,
    /// Groups the tasks of one conversation.
    #[serde(rename = "contextId")]
    pub context_id: String,
    pub status: TaskStatus,
    /// Conversation so far, oldest first.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub history: Vec<Message>,
    /// Extension data keyed by extension id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

fn default_task_kind() -> String {
    TASK_KIND.to_string()
}

/// Who sent a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

/// One turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Discriminator, always `"message"`.
    #[serde(default = "default_message_kind")]
    pub kind: String,
    /// Sender-generated id, usually a UUID.
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub role: MessageRole,
    /// Message body, in order.
    pub parts: Vec<Part>,
    /// Conversation the message belongs to.
    #[serde(skip_serializing_if = "Option::is_none", rename = "contextId")]
    pub context_id: Option<String>,
    /// Task the message belongs to; absent on the first message of a new task.
    #[serde(skip_serializing_if = "Option::is_none", rename = "taskId")]
    pub task_id: Option<String>,
    /// Extension data keyed by extension id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

fn default_message_kind() -> String {
    MESSAGE_KIND.to_string()
}

impl Message {
    /// Builds a single-part text message with the given role and message id.
    pub fn text(role: MessageRole, message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MESSAGE_KIND.to_string(),
            message_id: message_id.into(),
            role,
            parts: vec![Part::Text {
                text: text.into(),
                metadata: None,
            }],
            context_id: None,
            task_id: None,
            metadata: None,
        }
    }

    /// Concatenates every text part of the message, in order.
    pub fn text_content(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}

/// A discriminated union representing a part of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    /// Plain text.
    Text {
        text: String,
        /// Extension data for this part.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, serde_json::Value>>,
    },
    /// Structured JSON payload.
    Data {
        data: serde_json::Value,
        /// Extension data for this part.
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, serde_json::Value>>,
    },
}

impl Part {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Notifies a client that a task's status changed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusUpdateEvent {
    /// Discriminator, always `"status-update"`.
    #[serde(default = "default_status_update_kind")]
    pub kind: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(rename = "contextId")]
    pub context_id: String,
    pub status: TaskStatus,
    /// Set on the last event of a stream: the task reached a terminal state.
    #[serde(rename = "final")]
    pub is_final: bool,
    /// Extension data, e.g. the relay's `requestId` and `updateKind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

fn default_status_update_kind() -> String {
    STATUS_UPDATE_KIND.to_string()
}

// ============================================================================
// A2A Method Parameter Types
// ============================================================================

/// Params of `message/send` and `message/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSendParams {
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<MessageSendConfiguration>,
    /// Extension data keyed by extension id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Options of a `message/send` or `message/stream` call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageSendConfiguration {
    /// If true, the client will wait for the task to complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking: Option<bool>,
    /// Keep only this many of the most recent history messages in the response.
    #[serde(skip_serializing_if = "Option::is_none", rename = "historyLength")]
    pub history_length: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIdParams {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskQueryParams {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "historyLength")]
    pub history_length: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

// ============================================================================
// A2A Request Types
// ============================================================================

fn default_jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2ARequest {
    #[serde(default = "default_jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JSONRPCId>,
    #[serde(flatten)]
    pub payload: A2ARequestPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum A2ARequestPayload {
    #[serde(rename = "message/send")]
    SendMessage { params: MessageSendParams },
    #[serde(rename = "message/stream")]
    SendStreamingMessage { params: MessageSendParams },
    #[serde(rename = "tasks/get")]
    GetTask { params: TaskQueryParams },
    #[serde(rename = "tasks/cancel")]
    CancelTask { params: TaskIdParams },
    #[serde(rename = "tasks/resubscribe")]
    TaskResubscription { params: TaskIdParams },
}

// ============================================================================
// A2A Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendMessageResult {
    Task(Task),
    Message(Message),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageSuccessResponse {
    pub jsonrpc: String, // Always "2.0"
    pub result: SendMessageResult,
    pub id: Option<JSONRPCId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendMessageResponse {
    Success(Box<SendMessageSuccessResponse>),
    Error(JSONRPCErrorResponse),
}

/// One item of a `message/stream` or `tasks/resubscribe` stream.
///
/// Discriminated by `kind` on the wire; `Task` is tried first because a status
/// update never carries an `id` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendStreamingMessageResult {
    Task(Task),
    Message(Message),
    TaskStatusUpdate(TaskStatusUpdateEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendStreamingMessageSuccessResponse {
    pub jsonrpc: String, // Always "2.0"
    pub result: SendStreamingMessageResult,
    pub id: Option<JSONRPCId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendStreamingMessageResponse {
    Success(Box<SendStreamingMessageSuccessResponse>),
    Error(JSONRPCErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskSuccessResponse {
    pub jsonrpc: String, // Always "2.0"
    pub result: Task,
    pub id: Option<JSONRPCId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GetTaskResponse {
    Success(Box<GetTaskSuccessResponse>),
    Error(JSONRPCErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTaskSuccessResponse {
    pub jsonrpc: String, // Always "2.0"
    pub result: Task,
    pub id: Option<JSONRPCId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CancelTaskResponse {
    Success(Box<CancelTaskSuccessResponse>),
    Error(JSONRPCErrorResponse),
}

// Constants for type values
pub const JSONRPC_VERSION: &str = "2.0";
pub const TASK_KIND: &str = "task";
pub const MESSAGE_KIND: &str = "message";
pub const STATUS_UPDATE_KIND: &str = "status-update";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_state_uses_kebab_case_wire_names() {
        assert_eq!(
            serde_json::to_value(TaskState::InputRequired).unwrap(),
            json!("input-required")
        );
        let parsed: TaskState = serde_json::from_value(json!("canceled")).unwrap();
        assert_eq!(parsed, TaskState::Canceled);
        assert_eq!(TaskState::Working.to_string(), "working");
    }

    #[test]
    fn request_payload_is_tagged_by_method() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tasks/get",
            "params": {"id": "task-1"}
        });
        let request: A2ARequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.id, Some(JSONRPCId::Integer(7)));
        match request.payload {
            A2ARequestPayload::GetTask { params } => assert_eq!(params.id, "task-1"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn streaming_result_distinguishes_task_from_status_update() {
        let update = json!({
            "kind": "status-update",
            "taskId": "t",
            "contextId": "c",
            "status": {"state": "working"},
            "final": false
        });
        let parsed: SendStreamingMessageResult = serde_json::from_value(update).unwrap();
        assert!(matches!(
            parsed,
            SendStreamingMessageResult::TaskStatusUpdate(_)
        ));

        let task = json!({
            "kind": "task",
            "id": "t",
            "contextId": "c",
            "status": {"state": "completed"}
        });
        let parsed: SendStreamingMessageResult = serde_json::from_value(task).unwrap();
        assert!(matches!(parsed, SendStreamingMessageResult::Task(_)));
    }

    #[test]
    fn error_response_parses_as_error_variant() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "error": {"code": -32001, "message": "Task not found"}
        });
        let parsed: SendStreamingMessageResponse = serde_json::from_value(raw).unwrap();
        match parsed {
            SendStreamingMessageResponse::Error(err) => {
                assert_eq!(err.error.code, TASK_NOT_FOUND_ERROR_CODE)
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn message_text_content_joins_text_parts() {
        let mut message = Message::text(MessageRole::User, "m1", "Hello, ");
        message.parts.push(Part::Data {
            data: json!({"ignored": true}),
            metadata: None,
        });
        message.parts.push(Part::Text {
            text: "world".into(),
            metadata: None,
        });
        assert_eq!(message.text_content(), "Hello, world");
    }
}
