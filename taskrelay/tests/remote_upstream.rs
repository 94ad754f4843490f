//! `/api/stream` and the remote connector against a remote A2A agent.
//!
//! The agent is itself a relay served on an ephemeral port, so the remote
//! connector is exercised over real HTTP and SSE.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use std::sync::Arc;
use taskrelay::a2a::{Message, MessageRole};
use taskrelay::config::{RelayConfig, UpstreamConfig};
use taskrelay::events::{EventSource, ExecutionEvent, ScriptedEventSource};
use taskrelay::runtime::context::RequestContext;
use taskrelay::runtime::RelayRuntime;
use taskrelay::sink::{describe_update, RemoteConnector, SseFrame, UpstreamConnector};
use taskrelay::test_support::{body_text, failing_after, football_events, parse_sse_frames};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceExt;

struct Agent {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl Agent {
    async fn spawn(source: impl EventSource + 'static) -> Self {
        let runtime = RelayRuntime::builder(RelayConfig::default())
            .event_source(source)
            .build()
            .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            runtime
                .serve_with_shutdown(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base_url,
            shutdown: Some(tx),
            server,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.server.await.unwrap();
    }
}

fn proxy_for(base_url: &str) -> Arc<RelayRuntime> {
    let config = RelayConfig {
        upstream: UpstreamConfig {
            base_url: Some(base_url.to_string()),
        },
        ..RelayConfig::default()
    };
    Arc::new(RelayRuntime::from_config(config).unwrap())
}

async fn stream(proxy: &Arc<RelayRuntime>, text: &str) -> Vec<SseFrame> {
    let response = proxy
        .clone()
        .router()
        .oneshot(
            Request::builder()
                .uri(format!("/api/stream?text={text}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    parse_sse_frames(&body_text(response).await)
}

#[tokio::test]
async fn remote_agent_updates_are_relayed_as_frames() {
    let agent = Agent::spawn(ScriptedEventSource::from_events(football_events())).await;
    let proxy = proxy_for(&agent.base_url);

    let frames = stream(&proxy, "What%20defense%20beats%20a%204-3%3F").await;
    assert_eq!(frames.len(), 5, "{frames:?}");
    assert!(matches!(frames[0], SseFrame::Start { .. }));
    assert!(
        matches!(&frames[1], SseFrame::Status { text, .. } if text == "SUBAGENT CALLED: football-agent")
    );
    assert!(
        matches!(&frames[2], SseFrame::Message { text, .. } if text == "Use a Cover 2 with a robber safety.")
    );
    assert!(matches!(&frames[3], SseFrame::Status { text, .. } if text == "SUBAGENT RETURNED"));
    assert!(matches!(frames[4], SseFrame::Done { .. }));

    let request_id = frames[0].request_id();
    assert!(frames.iter().all(|frame| frame.request_id() == request_id));

    agent.stop().await;
}

#[tokio::test]
async fn remote_connection_prints_one_line_per_update() {
    let agent = Agent::spawn(ScriptedEventSource::from_events(football_events())).await;

    let connector = RemoteConnector::new(&agent.base_url).unwrap();
    let mut connection = connector.connect(&RequestContext::new()).await.unwrap();
    let message = Message::text(MessageRole::User, "msg-1", "What defense beats a 4-3?");
    let lines: Vec<String> = connection
        .send_message(message)
        .await
        .unwrap()
        .map(|item| describe_update(&item.unwrap()))
        .collect()
        .await;
    connection.close().await;

    assert_eq!(
        lines,
        vec![
            "state=submitted",
            "state=working text=SUBAGENT CALLED: football-agent",
            "state=working text=Use a Cover 2 with a robber safety.",
            "state=working text=SUBAGENT RETURNED",
            "state=completed",
        ]
    );

    agent.stop().await;
}

#[tokio::test]
async fn remote_failures_end_the_stream_with_an_error() {
    let agent = Agent::spawn(failing_after(
        [ExecutionEvent::subtask_start("football-agent")],
        "agent crashed",
    ))
    .await;
    let proxy = proxy_for(&agent.base_url);

    let frames = stream(&proxy, "hi").await;
    assert_eq!(frames.len(), 3, "{frames:?}");
    assert!(matches!(frames[1], SseFrame::Status { .. }));
    match &frames[2] {
        SseFrame::Error { message, .. } => assert!(message.contains("agent crashed"), "{message}"),
        other => panic!("expected error frame, got {other:?}"),
    }

    agent.stop().await;
}

#[tokio::test]
async fn unreachable_agent_is_reported_after_start() {
    // Bind and release a port so nothing is listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let proxy = proxy_for(&base_url);
    let frames = stream(&proxy, "hi").await;
    assert_eq!(frames.len(), 2, "{frames:?}");
    assert!(matches!(frames[0], SseFrame::Start { .. }));
    assert!(matches!(frames[1], SseFrame::Error { .. }));
}

#[tokio::test]
async fn health_reports_the_remote_base_url() {
    let proxy = proxy_for("http://agent.internal:9000");
    let response = proxy
        .clone()
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["ok"], "true");
    assert_eq!(body["upstream_base_url"], "http://agent.internal:9000");
}
