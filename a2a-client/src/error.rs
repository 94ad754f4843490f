//! Errors of A2A client calls

use thiserror::Error;

/// Why an A2A call failed
#[derive(Debug, Error)]
pub enum A2AError {
    /// The agent could not be reached, or the HTTP exchange failed
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// A payload could not be encoded or decoded
    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    /// The agent answered with a JSON-RPC error
    #[error("Remote agent error: {message}")]
    RemoteAgentError { message: String, code: Option<i32> },

    /// The client was misconfigured or given bad input
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },
}

impl A2AError {
    /// True when the request never reached the remote agent or the transport broke.
    pub fn is_network(&self) -> bool {
        matches!(self, A2AError::NetworkError { .. })
    }
}

/// Result of an A2A client call
pub type A2AResult<T> = std::result::Result<T, A2AError>;

impl From<reqwest::Error> for A2AError {
    fn from(error: reqwest::Error) -> Self {
        A2AError::NetworkError {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for A2AError {
    fn from(error: serde_json::Error) -> Self {
        A2AError::SerializationError {
            message: error.to_string(),
        }
    }
}
