use a2a_types::TaskState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Main error type for the task relay
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // === Task Lifecycle Errors ===
    #[error("Invalid task state transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Task already exists: {task_id}")]
    TaskAlreadyExists { task_id: String },

    // === Upstream Errors ===
    #[error("Upstream unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error("Upstream failure: {reason}")]
    UpstreamFailure { reason: String },

    #[error("Client disconnected")]
    ClientDisconnected,

    // === Request & Configuration Errors ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // === Infrastructure Errors ===
    #[error("Serialization error ({format}): {reason}")]
    Serialization { format: String, reason: String },

    #[error("Network error during {operation}: {reason}")]
    Network { operation: String, reason: String },

    #[error("Internal error in {component}: {reason}")]
    Internal { component: String, reason: String },

    #[error("Server failed to start: {0}")]
    ServerStartFailed(String),
}

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// True for failures caused by the event source or remote agent.
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::UpstreamFailure { .. }
        )
    }

    /// Reclassifies an error raised while opening an upstream connection.
    #[must_use]
    pub fn into_unavailable(self) -> Self {
        match self {
            Self::UpstreamUnavailable { .. } | Self::ClientDisconnected => self,
            Self::UpstreamFailure { reason } => Self::UpstreamUnavailable { reason },
            other => Self::UpstreamUnavailable {
                reason: other.to_string(),
            },
        }
    }

    /// Reclassifies an error raised after the upstream produced its first event.
    #[must_use]
    pub fn into_failure(self) -> Self {
        match self {
            Self::UpstreamFailure { .. } | Self::ClientDisconnected => self,
            Self::UpstreamUnavailable { reason } => Self::UpstreamFailure { reason },
            other => Self::UpstreamFailure {
                reason: other.to_string(),
            },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::TaskNotFound { .. } => StatusCode::NOT_FOUND,

            Self::InvalidInput(..) | Self::InvalidConfiguration { .. } => StatusCode::BAD_REQUEST,

            Self::InvalidTransition { .. } | Self::TaskAlreadyExists { .. } => {
                StatusCode::CONFLICT
            }

            Self::UpstreamUnavailable { .. } | Self::UpstreamFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl LoaderError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<LoaderError> for RelayError {
    fn from(error: LoaderError) -> Self {
        Self::InvalidConfiguration {
            field: "config".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            format: "json".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for RelayError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            format: "yaml".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(error: std::io::Error) -> Self {
        Self::Internal {
            component: "io".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for RelayError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Internal {
            component: "task_join".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network {
            operation: "http_request".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<a2a_client::A2AError> for RelayError {
    fn from(error: a2a_client::A2AError) -> Self {
        use a2a_client::A2AError;
        match error {
            A2AError::NetworkError { message } => Self::UpstreamUnavailable { reason: message },
            A2AError::RemoteAgentError { message, code } => Self::UpstreamFailure {
                reason: code.map_or_else(|| message.clone(), |c| format!("{message} (code {c})")),
            },
            A2AError::SerializationError { message } => Self::Serialization {
                format: "json".to_string(),
                reason: message,
            },
            A2AError::InvalidParameter { message } => Self::InvalidInput(message),
        }
    }
}
