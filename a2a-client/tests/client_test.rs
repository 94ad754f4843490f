//! Tests for `A2AClient` against an in-process mock agent.

use a2a_client::{A2AClient, A2AError};
use a2a_types::{
    Message, MessageRole, MessageSendParams, SendStreamingMessageResult, TaskIdParams, TaskQueryParams,
    TaskState,
};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};

fn task_json(id: &str, state: &str) -> Value {
    json!({
        "kind": "task",
        "id": id,
        "contextId": "ctx-1",
        "status": { "state": state },
    })
}

fn success(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: &Value, code: i32, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

async fn mock_rpc(headers: HeaderMap, Json(request): Json<Value>) -> Response {
    let id = request["id"].clone();
    match request["method"].as_str().unwrap_or_default() {
        "message/stream" if request["params"]["message"]["parts"][0]["text"] == "explode" => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(failure(&id, -32603, "agent overloaded")),
        )
            .into_response(),
        "message/stream" => {
            let status = json!({
                "kind": "status-update",
                "taskId": "task-1",
                "contextId": "ctx-1",
                "status": {
                    "state": "working",
                    "message": {
                        "kind": "message",
                        "messageId": "m-1",
                        "role": "agent",
                        "parts": [{ "kind": "text", "text": "thinking" }],
                    },
                },
                "final": false,
            });
            // Keep-alive comments and CRLF line endings must be tolerated.
            let body = format!(
                ": keep-alive\r\n\r\ndata: {}\r\n\r\ndata: {}\n\ndata: {}\n\n",
                success(&id, task_json("task-1", "submitted")),
                success(&id, status),
                success(&id, task_json("task-1", "completed")),
            );
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        "tasks/resubscribe" => Json(failure(&id, -32001, "Task not found")).into_response(),
        "tasks/get" => {
            let authorized = headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                == Some("Bearer secret");
            let task_id = if authorized { "authorized" } else { "anonymous" };
            Json(success(&id, task_json(task_id, "working"))).into_response()
        }
        "tasks/cancel" => Json(failure(&id, -32002, "Task cannot be canceled")).into_response(),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(failure(&id, -32603, "agent exploded")),
        )
            .into_response(),
    }
}

async fn spawn_mock_agent() -> String {
    let app = Router::new().route("/rpc", post(mock_rpc));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

fn params(text: &str) -> MessageSendParams {
    MessageSendParams {
        message: Message::text(MessageRole::User, "msg-1", text),
        configuration: None,
        metadata: None,
    }
}

#[tokio::test]
async fn streaming_message_decodes_every_event() {
    let client = A2AClient::new(spawn_mock_agent().await).unwrap();

    let results: Vec<_> = client
        .send_streaming_message(params("hi"))
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(results.len(), 3);

    match &results[0] {
        Ok(SendStreamingMessageResult::Task(task)) => {
            assert_eq!(task.status.state, TaskState::Submitted)
        }
        other => panic!("expected task, got {other:?}"),
    }
    match &results[1] {
        Ok(SendStreamingMessageResult::TaskStatusUpdate(update)) => {
            assert!(!update.is_final);
            let text = update.status.message.as_ref().unwrap().text_content();
            assert_eq!(text, "thinking");
        }
        other => panic!("expected status update, got {other:?}"),
    }
    match &results[2] {
        Ok(SendStreamingMessageResult::Task(task)) => {
            assert_eq!(task.status.state, TaskState::Completed)
        }
        other => panic!("expected task, got {other:?}"),
    }
}

#[tokio::test]
async fn rpc_error_before_streaming_is_a_remote_error() {
    let client = A2AClient::new(spawn_mock_agent().await).unwrap();

    let err = match client
        .resubscribe_task(TaskIdParams {
            id: "missing".into(),
            metadata: None,
        })
        .await
    {
        Ok(_) => panic!("resubscribe should fail"),
        Err(err) => err,
    };
    assert!(
        matches!(err, A2AError::RemoteAgentError { code: Some(-32001), .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn bearer_token_is_sent_with_requests() {
    let base_url = spawn_mock_agent().await;
    let query = || TaskQueryParams {
        id: "task-1".into(),
        history_length: None,
        metadata: None,
    };

    let anonymous = A2AClient::new(&base_url).unwrap();
    assert_eq!(anonymous.get_task(query()).await.unwrap().id, "anonymous");

    let authorized = A2AClient::new(&base_url).unwrap().with_auth_token("secret");
    assert_eq!(authorized.get_task(query()).await.unwrap().id, "authorized");
}

#[tokio::test]
async fn jsonrpc_errors_keep_their_code() {
    let client = A2AClient::new(spawn_mock_agent().await).unwrap();

    let err = client
        .cancel_task(TaskIdParams {
            id: "task-1".into(),
            metadata: None,
        })
        .await
        .unwrap_err();
    assert!(
        matches!(err, A2AError::RemoteAgentError { code: Some(-32002), ref message } if message == "Task cannot be canceled"),
        "{err:?}"
    );

    // Error bodies on non-2xx responses are still decoded.
    let err = client.send_message(params("hi")).await.unwrap_err();
    assert!(
        matches!(err, A2AError::RemoteAgentError { code: Some(-32603), .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn streaming_error_status_keeps_the_rpc_error() {
    let client = A2AClient::new(spawn_mock_agent().await).unwrap();

    let err = match client.send_streaming_message(params("explode")).await {
        Ok(_) => panic!("stream should not open"),
        Err(err) => err,
    };
    assert!(
        matches!(err, A2AError::RemoteAgentError { code: Some(-32603), ref message } if message == "agent overloaded"),
        "{err:?}"
    );
}

#[tokio::test]
async fn unreachable_agent_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let client = A2AClient::new(format!("http://{address}")).unwrap();
    let err = client
        .get_task(TaskQueryParams {
            id: "t".into(),
            history_length: None,
            metadata: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_network(), "{err:?}");
}
