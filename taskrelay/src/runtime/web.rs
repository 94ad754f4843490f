//! A2A JSON-RPC handlers.

use crate::errors::RelayError;
use crate::runtime::core::error_mapper::{
    invalid_request_error, task_not_cancelable_error, to_jsonrpc_error,
};
use crate::runtime::core::executor::ExecutionLink;
use crate::runtime::core::status_mapper::{create_status_update_event, is_terminal_state};
use crate::runtime::{RelayRuntime, RequestContext};
use crate::sink::rpc::{task_updates, TaskUpdateStream};
use a2a_types::{
    A2ARequest, A2ARequestPayload, CancelTaskResponse, CancelTaskSuccessResponse, GetTaskResponse,
    GetTaskSuccessResponse, JSONRPCError, JSONRPCErrorResponse, JSONRPCId, MessageSendParams,
    SendMessageResponse, SendMessageResult, SendMessageSuccessResponse,
    SendStreamingMessageResponse, SendStreamingMessageResult, SendStreamingMessageSuccessResponse,
    TaskIdParams, TaskQueryParams, JSONRPC_VERSION,
};
use async_stream::stream;
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const KNOWN_METHODS: [&str; 5] = [
    "message/send",
    "message/stream",
    "tasks/get",
    "tasks/cancel",
    "tasks/resubscribe",
];

/// Axum handler for JSON-RPC requests.
///
/// This function will handle `POST /rpc` requests.
pub async fn json_rpc_handler(State(runtime): State<Arc<RelayRuntime>>, body: Bytes) -> Response {
    let payload = match parse_request(&body) {
        Ok(payload) => payload,
        Err((request_id, error)) => return build_error_response(request_id, error),
    };
    let request_id = payload.id.clone();

    match payload.payload {
        A2ARequestPayload::SendStreamingMessage { params } => {
            handle_message_stream(&runtime, request_id, params).await
        }
        A2ARequestPayload::TaskResubscription { params } => {
            handle_task_resubscribe(&runtime, request_id, params).await
        }
        A2ARequestPayload::SendMessage { params } => {
            handle_send_message(&runtime, request_id, params).await
        }
        A2ARequestPayload::GetTask { params } => {
            handle_get_task(&runtime, request_id, params).await
        }
        A2ARequestPayload::CancelTask { params } => {
            handle_cancel_task(&runtime, request_id, params).await
        }
    }
}

/// Axum handler for the `message/stream` endpoint.
pub async fn message_stream_handler(
    State(runtime): State<Arc<RelayRuntime>>,
    Json(params): Json<MessageSendParams>,
) -> Response {
    handle_message_stream(&runtime, None, params).await
}

/// Axum handler for the `tasks/:id:subscribe` endpoint.
pub async fn task_resubscribe_handler(
    State(runtime): State<Arc<RelayRuntime>>,
    Path(raw_task_id): Path<String>,
) -> Response {
    let task_id = match raw_task_id.strip_suffix(":subscribe") {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            return RelayError::InvalidInput(
                "tasks/:id:subscribe route requires suffix ':subscribe'".to_string(),
            )
            .into_response()
        }
    };

    let params = TaskIdParams {
        id: task_id,
        metadata: None,
    };
    handle_task_resubscribe(&runtime, None, params).await
}

/// Decodes a request body, telling malformed JSON, unknown methods and bad
/// params apart.
fn parse_request(body: &[u8]) -> Result<A2ARequest, (Option<JSONRPCId>, JSONRPCError)> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| (None, JSONRPCError::json_parse().with_data(e.to_string().into())))?;

    let request_id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<JSONRPCId>(id.clone()).ok());
    let method = value.get("method").and_then(serde_json::Value::as_str);

    match method {
        None => Err((
            request_id,
            invalid_request_error("request has no method"),
        )),
        Some(method) if !KNOWN_METHODS.contains(&method) => Err((
            request_id,
            JSONRPCError::method_not_found().with_data(serde_json::json!({ "method": method })),
        )),
        Some(_) => serde_json::from_value::<A2ARequest>(value).map_err(|e| {
            (
                request_id,
                JSONRPCError::invalid_params().with_data(e.to_string().into()),
            )
        }),
    }
}

async fn handle_send_message(
    runtime: &RelayRuntime,
    request_id: Option<JSONRPCId>,
    params: MessageSendParams,
) -> Response {
    let executor = runtime.executor();
    let ctx = RequestContext::new();
    let configuration = params.configuration.clone().unwrap_or_default();

    let result = if configuration.blocking == Some(false) {
        match executor
            .start_task(params.message, &ctx, ExecutionLink::Detached)
            .await
        {
            Ok(subscription) => {
                executor
                    .get_task(&subscription.snapshot.id, configuration.history_length)
                    .await
            }
            Err(error) => Err(error),
        }
    } else {
        match executor.send_blocking(params.message, &ctx).await {
            Ok(task) if configuration.history_length.is_some() => {
                executor.get_task(&task.id, configuration.history_length).await
            }
            other => other,
        }
    };

    match result {
        Ok(task) => build_send_message_success_response(request_id, SendMessageResult::Task(task)),
        Err(error) => build_error_response(request_id, to_jsonrpc_error(error)),
    }
}

async fn handle_message_stream(
    runtime: &RelayRuntime,
    request_id: Option<JSONRPCId>,
    params: MessageSendParams,
) -> Response {
    let executor = runtime.executor();
    let ctx = RequestContext::new();
    // Streaming clients may drop and resubscribe; the run keeps going.
    match executor
        .start_task(params.message, &ctx, ExecutionLink::Detached)
        .await
    {
        Ok(subscription) => {
            let updates = task_updates(executor.state().clone(), subscription);
            build_streaming_sse(request_id, updates, runtime.config().keep_alive()).into_response()
        }
        Err(error) => build_error_response(request_id, to_jsonrpc_error(error)),
    }
}

async fn handle_task_resubscribe(
    runtime: &RelayRuntime,
    request_id: Option<JSONRPCId>,
    params: TaskIdParams,
) -> Response {
    let executor = runtime.executor();
    match executor.resubscribe(&params.id).await {
        Ok(subscription) => {
            let updates = task_updates(executor.state().clone(), subscription);
            build_streaming_sse(request_id, updates, runtime.config().keep_alive()).into_response()
        }
        Err(error) => build_error_response(request_id, to_jsonrpc_error(error)),
    }
}

async fn handle_get_task(
    runtime: &RelayRuntime,
    request_id: Option<JSONRPCId>,
    params: TaskQueryParams,
) -> Response {
    match runtime
        .executor()
        .get_task(&params.id, params.history_length)
        .await
    {
        Ok(task) => {
            let response = GetTaskResponse::Success(Box::new(GetTaskSuccessResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                result: task,
                id: request_id,
            }));
            Json(response).into_response()
        }
        Err(error) => build_error_response(request_id, to_jsonrpc_error(error)),
    }
}

async fn handle_cancel_task(
    runtime: &RelayRuntime,
    request_id: Option<JSONRPCId>,
    params: TaskIdParams,
) -> Response {
    match runtime.executor().cancel_task(&params.id).await {
        Ok(task) => {
            let response = CancelTaskResponse::Success(Box::new(CancelTaskSuccessResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                result: task,
                id: request_id,
            }));
            Json(response).into_response()
        }
        Err(RelayError::InvalidTransition { task_id, from, .. }) => {
            build_error_response(request_id, task_not_cancelable_error(&task_id, from))
        }
        Err(error) => build_error_response(request_id, to_jsonrpc_error(error)),
    }
}

/// Renders a task update stream as SSE.
///
/// The first frame is the task as attached to. Each non-final update becomes a
/// status-update frame; the terminal state is sent as a final status-update
/// followed by the final task. An upstream error ends the stream with a
/// JSON-RPC error frame.
fn build_streaming_sse(
    request_id: Option<JSONRPCId>,
    updates: TaskUpdateStream,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream! {
        let mut updates = updates;
        while let Some(item) = updates.next().await {
            match item {
                Ok((_, Some(update))) => {
                    let result = SendStreamingMessageResult::TaskStatusUpdate(update);
                    if let Some(event) = result_to_event(&request_id, result) {
                        yield Ok(event);
                    }
                }
                Ok((task, None)) if is_terminal_state(&task.status.state) => {
                    let update =
                        create_status_update_event(&task.id, &task.context_id, task.status.clone(), true);
                    let result = SendStreamingMessageResult::TaskStatusUpdate(update);
                    if let Some(event) = result_to_event(&request_id, result) {
                        yield Ok(event);
                    }
                    if let Some(event) = result_to_event(&request_id, SendStreamingMessageResult::Task(task)) {
                        yield Ok(event);
                    }
                    break;
                }
                Ok((task, None)) => {
                    if let Some(event) = result_to_event(&request_id, SendStreamingMessageResult::Task(task)) {
                        yield Ok(event);
                    }
                }
                Err(error) => {
                    if error.is_upstream() {
                        debug!(error = %error, "task stream ended with upstream error");
                    } else {
                        warn!(error = %error, "task stream ended with error");
                    }
                    if let Some(event) = error_to_event(&request_id, to_jsonrpc_error(error)) {
                        yield Ok(event);
                    }
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive))
}

fn build_send_message_success_response(
    request_id: Option<JSONRPCId>,
    result: SendMessageResult,
) -> Response {
    let response = SendMessageResponse::Success(Box::new(SendMessageSuccessResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        result,
        id: request_id,
    }));

    Json(response).into_response()
}

fn build_error_response(request_id: Option<JSONRPCId>, error: JSONRPCError) -> Response {
    Json(JSONRPCErrorResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        error,
        id: request_id,
    })
    .into_response()
}

fn result_to_event(
    request_id: &Option<JSONRPCId>,
    result: SendStreamingMessageResult,
) -> Option<Event> {
    let response =
        SendStreamingMessageResponse::Success(Box::new(SendStreamingMessageSuccessResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            id: request_id.clone(),
        }));

    serde_json::to_string(&response)
        .ok()
        .map(|data| Event::default().data(data))
}

fn error_to_event(request_id: &Option<JSONRPCId>, error: JSONRPCError) -> Option<Event> {
    let response = SendStreamingMessageResponse::Error(JSONRPCErrorResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        error,
        id: request_id.clone(),
    });

    serde_json::to_string(&response)
        .ok()
        .map(|data| Event::default().data(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_types::{
        JSON_PARSE_ERROR_CODE, INVALID_PARAMS_ERROR_CODE, METHOD_NOT_FOUND_ERROR_CODE,
    };

    #[test]
    fn parse_request_distinguishes_failures() {
        let (_, err) = parse_request(b"{not json").unwrap_err();
        assert_eq!(err.code, JSON_PARSE_ERROR_CODE);

        let (id, err) =
            parse_request(br#"{"jsonrpc":"2.0","id":7,"method":"tasks/list","params":{}}"#)
                .unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND_ERROR_CODE);
        assert_eq!(id, Some(JSONRPCId::Integer(7)));

        let (_, err) =
            parse_request(br#"{"jsonrpc":"2.0","id":"a","method":"tasks/get","params":{}}"#)
                .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS_ERROR_CODE);

        let ok = parse_request(
            br#"{"jsonrpc":"2.0","id":"a","method":"tasks/get","params":{"id":"t-1"}}"#,
        )
        .unwrap();
        assert!(matches!(ok.payload, A2ARequestPayload::GetTask { .. }));
    }
}
