//! JSON-RPC client for remote A2A agents
//!
//! Unary calls decode a single JSON-RPC response; streaming calls decode the
//! `text/event-stream` body into one [`SendStreamingMessageResult`] per event.

use crate::constants::{EVENT_STREAM_CONTENT_TYPE, JSONRPC_VERSION, RPC_PATH};
use crate::error::{A2AError, A2AResult};
use crate::sse;
use a2a_types::{
    JSONRPCErrorResponse, JSONRPCId, MessageSendParams, SendMessageResult,
    SendStreamingMessageResult, Task, TaskIdParams, TaskQueryParams,
};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Items of a `message/stream` or `tasks/resubscribe` call, in arrival order.
pub type StreamingResults =
    Pin<Box<dyn Stream<Item = A2AResult<SendStreamingMessageResult>> + Send>>;

/// Calls one remote agent; cheap to clone.
#[derive(Clone, Debug)]
pub struct A2AClient {
    /// Shared connection pool
    client: Client,
    /// JSON-RPC endpoint URL
    rpc_url: String,
    /// Bearer token sent with every call
    auth_token: Option<String>,
    /// Source of JSON-RPC ids
    request_id_counter: Arc<AtomicU64>,
}

/// Outgoing JSON-RPC envelope
#[derive(Debug, Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: String,
    id: JSONRPCId,
    method: String,
    params: T,
}

/// Incoming JSON-RPC envelope, success or error
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRpcResponse<T> {
    Success {
        #[allow(dead_code)]
        jsonrpc: String,
        id: Option<JSONRPCId>,
        result: T,
    },
    Error(JSONRPCErrorResponse),
}

impl<T> JsonRpcResponse<T> {
    fn into_result(self) -> A2AResult<T> {
        match self {
            JsonRpcResponse::Success { result, .. } => Ok(result),
            JsonRpcResponse::Error(err) => Err(A2AError::RemoteAgentError {
                message: err.error.message,
                code: Some(err.error.code),
            }),
        }
    }
}

impl A2AClient {
    /// Create a client for the agent served at `base_url`
    ///
    /// Requests are posted to `{base_url}/rpc`. Uses a default `reqwest::Client`;
    /// for custom HTTP configuration, use `with_client()`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use a2a_client::A2AClient;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = A2AClient::new("http://localhost:8001")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> A2AResult<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client with a pre-configured `reqwest::Client`
    ///
    /// This allows custom settings like timeouts, proxies, TLS config or default headers.
    pub fn with_client(base_url: impl AsRef<str>, http_client: Client) -> A2AResult<Self> {
        let base_url = base_url.as_ref().trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(A2AError::InvalidParameter {
                message: "Agent base URL must not be empty".to_string(),
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(A2AError::InvalidParameter {
                message: format!("Agent base URL must be http(s), got '{}'", base_url),
            });
        }

        Ok(Self {
            client: http_client,
            rpc_url: format!("{}/{}", base_url, RPC_PATH),
            auth_token: None,
            request_id_counter: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Sends `token` as a bearer token on every call
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// The JSON-RPC endpoint this client posts to
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Allocates a JSON-RPC id
    fn next_request_id(&self) -> JSONRPCId {
        let id = self.request_id_counter.fetch_add(1, Ordering::SeqCst);
        JSONRPCId::Integer(id as i64)
    }

    fn build_request<TParams: Serialize>(
        &self,
        request_id: JSONRPCId,
        method: &str,
        params: TParams,
        accept: &str,
    ) -> reqwest::RequestBuilder {
        let rpc_request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id: request_id,
        };

        let req = self
            .client
            .post(&self.rpc_url)
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .json(&rpc_request);

        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Posts a unary JSON-RPC call and decodes its result
    async fn post_rpc_request<TParams, TResponse>(
        &self,
        method: &str,
        params: TParams,
    ) -> A2AResult<TResponse>
    where
        TParams: Serialize,
        TResponse: for<'de> Deserialize<'de>,
    {
        let request_id = self.next_request_id();
        let response = self
            .build_request(request_id.clone(), method, params, "application/json")
            .send()
            .await
            .map_err(|e| A2AError::NetworkError {
                message: format!("Failed to send {} request: {}", method, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_json) = serde_json::from_str::<JSONRPCErrorResponse>(&error_text) {
                return JsonRpcResponse::<TResponse>::Error(error_json).into_result();
            }
            return Err(A2AError::NetworkError {
                message: format!("HTTP error {}: {}", status, error_text),
            });
        }

        let json_response: JsonRpcResponse<TResponse> =
            response
                .json()
                .await
                .map_err(|e| A2AError::SerializationError {
                    message: format!("Failed to parse {} response: {}", method, e),
                })?;

        if let JsonRpcResponse::Success {
            id: Some(resp_id), ..
        } = &json_response
        {
            if resp_id != &request_id {
                warn!(
                    method,
                    expected = ?request_id,
                    received = ?resp_id,
                    "RPC response ID mismatch"
                );
            }
        }

        json_response.into_result()
    }

    /// Posts a streaming JSON-RPC request and decodes the SSE response
    async fn post_streaming_request<TParams: Serialize>(
        &self,
        method: &str,
        params: TParams,
    ) -> A2AResult<StreamingResults> {
        let request_id = self.next_request_id();
        let response = self
            .build_request(request_id, method, params, EVENT_STREAM_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| A2AError::NetworkError {
                message: format!("Failed to send {} request: {}", method, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_json) = serde_json::from_str::<JSONRPCErrorResponse>(&error_text) {
                return Err(Self::remote_error(error_json));
            }
            return Err(A2AError::NetworkError {
                message: format!("HTTP error {}: {}", status, error_text),
            });
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.starts_with(EVENT_STREAM_CONTENT_TYPE) {
            // A JSON body here is an RPC error returned before streaming started
            let body = response.text().await.unwrap_or_default();
            if let Ok(error_json) = serde_json::from_str::<JSONRPCErrorResponse>(&body) {
                return Err(Self::remote_error(error_json));
            }
            return Err(A2AError::NetworkError {
                message: format!(
                    "Invalid response Content-Type for SSE stream. Expected '{}', got '{}'",
                    EVENT_STREAM_CONTENT_TYPE, content_type
                ),
            });
        }

        debug!(method, url = %self.rpc_url, "SSE stream opened");

        let events = sse::data_stream(response.bytes_stream()).map(|item| match item {
            Ok(data) => Self::process_sse_event(&data),
            Err(e) => Err(A2AError::NetworkError {
                message: format!("Stream error: {}", e),
            }),
        });
        Ok(Box::pin(events))
    }

    fn remote_error(response: JSONRPCErrorResponse) -> A2AError {
        A2AError::RemoteAgentError {
            message: response.error.message,
            code: Some(response.error.code),
        }
    }

    /// Decodes the payload of one SSE event
    fn process_sse_event(json_data: &str) -> A2AResult<SendStreamingMessageResult> {
        if json_data.trim().is_empty() {
            return Err(A2AError::SerializationError {
                message: "Empty SSE event data".to_string(),
            });
        }

        let json_response: JsonRpcResponse<SendStreamingMessageResult> =
            serde_json::from_str(json_data).map_err(|e| A2AError::SerializationError {
                message: format!("Failed to parse SSE event data: {}", e),
            })?;

        json_response.into_result()
    }

    /// `message/send`: the agent answers once the call is done
    pub async fn send_message(&self, params: MessageSendParams) -> A2AResult<SendMessageResult> {
        self.post_rpc_request("message/send", params).await
    }

    /// `message/stream`: task, message and status-update events as they happen
    ///
    /// Returns a stream of events (Task, Message, TaskStatusUpdateEvent)
    pub async fn send_streaming_message(
        &self,
        params: MessageSendParams,
    ) -> A2AResult<StreamingResults> {
        self.post_streaming_request("message/stream", params).await
    }

    /// `tasks/get`
    pub async fn get_task(&self, params: TaskQueryParams) -> A2AResult<Task> {
        self.post_rpc_request("tasks/get", params).await
    }

    /// `tasks/cancel`
    pub async fn cancel_task(&self, params: TaskIdParams) -> A2AResult<Task> {
        self.post_rpc_request("tasks/cancel", params).await
    }

    /// `tasks/resubscribe`: reattach to the event stream of a running task
    ///
    /// Used after the stream of an earlier call broke off.
    pub async fn resubscribe_task(&self, params: TaskIdParams) -> A2AResult<StreamingResults> {
        self.post_streaming_request("tasks/resubscribe", params).await
    }
}
