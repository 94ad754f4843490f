//! The relay runtime and its HTTP surface.
//!
//! A [`RelayRuntime`] is built once at startup and shared read-only with every
//! handler. It serves two surfaces:
//!
//! - the A2A JSON-RPC surface (`/rpc`, `/message:stream`, `/tasks/:id:subscribe`),
//!   backed by the in-process [`RequestExecutor`];
//! - the browser surface (`/api/stream`, `/api/health`), which talks to the
//!   configured [`UpstreamConnector`]: the local executor, or a remote A2A agent
//!   when `upstream.base_url` is set.

// Core context types
pub mod context;

pub mod logging;

// Core framework components
pub mod core;

// HTTP handlers
pub mod proxy;
pub mod web;

use crate::config::{EventSourceConfig, RelayConfig};
use crate::errors::{RelayError, RelayResult};
use crate::events::{EchoEventSource, EventSource, HttpEventSource, ScriptedEventSource};
use crate::runtime::core::{RequestExecutor, TaskEventBus};
use crate::sink::rpc::{LocalConnector, RemoteConnector, UpstreamConnector};
use crate::task::{InMemoryTaskStore, TaskStateMachine, TaskStore};
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub use context::RequestContext;

/// Process-wide relay state.
pub struct RelayRuntime {
    config: RelayConfig,
    executor: RequestExecutor,
    connector: Arc<dyn UpstreamConnector>,
}

impl RelayRuntime {
    /// Starts building a runtime for `config`.
    pub fn builder(config: RelayConfig) -> RelayRuntimeBuilder {
        RelayRuntimeBuilder {
            config,
            event_source: None,
            store: None,
            connector: None,
        }
    }

    /// Builds a runtime with everything derived from `config`.
    pub fn from_config(config: RelayConfig) -> RelayResult<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn connector(&self) -> Arc<dyn UpstreamConnector> {
        self.connector.clone()
    }

    /// Routes of both surfaces, with permissive CORS and request tracing.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/rpc", post(web::json_rpc_handler))
            .route("/message:stream", post(web::message_stream_handler))
            .route("/tasks/:task_id", post(web::task_resubscribe_handler))
            .route("/api/stream", get(proxy::stream_handler))
            .route("/api/health", get(proxy::health_handler))
            .with_state(self)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Serves on the configured bind address until Ctrl+C.
    pub async fn serve(self) -> RelayResult<()> {
        let listener = TcpListener::bind(&self.config.bind_address)
            .await
            .map_err(|e| RelayError::ServerStartFailed(e.to_string()))?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Cancels every run in flight and every open `/api/stream` request.
    ///
    /// Runs have no timeout, so open streams would otherwise keep a graceful
    /// shutdown waiting forever.
    pub fn shutdown(&self) {
        let cancelled = self.executor.shutdown();
        info!(cancelled, "cancelled in-flight executions");
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// Once it resolves, in-flight runs are cancelled; open streams then end
    /// with their terminal frame and this returns.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> RelayResult<()> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::ServerStartFailed(e.to_string()))?;
        info!(
            address = %local_addr,
            base_url = %self.config.public_base_url(),
            upstream = %self.connector.base_url(),
            "taskrelay listening"
        );

        let runtime = Arc::new(self);
        let app = runtime.clone().router();
        let signal = async move {
            shutdown.await;
            runtime.shutdown();
        };
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| RelayError::ServerStartFailed(e.to_string()))?;

        info!("server shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(err) => tracing::error!(error = %err, "failed to listen for Ctrl+C"),
    }
}

/// Builder for [`RelayRuntime`]; unset parts are derived from the config.
pub struct RelayRuntimeBuilder {
    config: RelayConfig,
    event_source: Option<Arc<dyn EventSource>>,
    store: Option<Arc<dyn TaskStore>>,
    connector: Option<Arc<dyn UpstreamConnector>>,
}

impl RelayRuntimeBuilder {
    pub fn event_source(mut self, source: impl EventSource + 'static) -> Self {
        self.event_source = Some(Arc::new(source));
        self
    }

    pub fn store(mut self, store: impl TaskStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Overrides the connector used by `/api/stream`.
    pub fn connector(mut self, connector: impl UpstreamConnector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    pub fn build(self) -> RelayResult<RelayRuntime> {
        self.config.validate()?;

        let event_source = match self.event_source {
            Some(source) => source,
            None => event_source_from_config(&self.config.event_source)?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let state = Arc::new(TaskStateMachine::new(store, Arc::new(TaskEventBus::new())));
        let executor = RequestExecutor::new(state, event_source);

        let connector: Arc<dyn UpstreamConnector> = match (self.connector, &self.config.upstream.base_url) {
            (Some(connector), _) => connector,
            (None, Some(base_url)) => Arc::new(RemoteConnector::new(base_url.clone())?),
            (None, None) => Arc::new(LocalConnector::new(
                executor.clone(),
                self.config.public_base_url(),
            )),
        };

        Ok(RelayRuntime {
            config: self.config,
            executor,
            connector,
        })
    }
}

fn event_source_from_config(config: &EventSourceConfig) -> RelayResult<Arc<dyn EventSource>> {
    Ok(match config {
        EventSourceConfig::Echo => Arc::new(EchoEventSource),
        EventSourceConfig::Http { url } => Arc::new(HttpEventSource::new(url.clone())?),
        EventSourceConfig::Scripted { events } => {
            Arc::new(ScriptedEventSource::from_events(events.clone()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;

    #[test]
    fn local_connector_reports_public_base_url() {
        let runtime = RelayRuntime::from_config(RelayConfig::default()).unwrap();
        assert_eq!(runtime.connector().base_url(), "http://localhost:8001");
    }

    #[test]
    fn upstream_base_url_selects_remote_connector() {
        let config = RelayConfig {
            upstream: UpstreamConfig {
                base_url: Some("http://remote-agent:9000".into()),
            },
            ..RelayConfig::default()
        };
        let runtime = RelayRuntime::from_config(config).unwrap();
        assert_eq!(runtime.connector().base_url(), "http://remote-agent:9000");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RelayConfig {
            bind_address: String::new(),
            ..RelayConfig::default()
        };
        assert!(matches!(
            RelayRuntime::from_config(config),
            Err(RelayError::InvalidConfiguration { .. })
        ));
    }
}
