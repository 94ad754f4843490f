use crate::errors::LoaderError;
use crate::events::ExecutionEvent;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Address the server binds to when nothing else is configured.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8001";

/// Keep-alive interval of A2A SSE responses.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;

/// Complete relay configuration from YAML/JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// Socket address to listen on
    pub bind_address: String,

    /// Public base URL; inferred from `bind_address` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Remote A2A agent to proxy `/api` requests to
    pub upstream: UpstreamConfig,

    /// Where execution events come from when running tasks in-process
    pub event_source: EventSourceConfig,

    pub sse: SseConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            base_url: None,
            upstream: UpstreamConfig::default(),
            event_source: EventSourceConfig::default(),
            sse: SseConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.bind_address.trim().is_empty() {
            return Err(LoaderError::validation("bind_address cannot be empty"));
        }
        if self.sse.keep_alive_secs == 0 {
            return Err(LoaderError::validation(
                "sse.keep_alive_secs must be greater than 0",
            ));
        }
        if let Some(base_url) = &self.base_url {
            validate_url("base_url", base_url)?;
        }
        if let Some(base_url) = &self.upstream.base_url {
            validate_url("upstream.base_url", base_url)?;
        }
        if let EventSourceConfig::Http { url } = &self.event_source {
            validate_url("event_source.url", url)?;
        }
        Ok(())
    }

    /// Base URL clients reach this relay at.
    pub fn public_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| infer_base_url(&self.bind_address))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse.keep_alive_secs)
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), LoaderError> {
    if url.trim().is_empty() {
        return Err(LoaderError::validation(format!("{field} cannot be empty")));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(LoaderError::validation(format!(
            "{field} must be an http(s) URL, got '{url}'"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Event source variants
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventSourceConfig {
    /// Answer every request with its own input
    #[default]
    Echo,
    /// External agent engine streaming events over SSE
    Http { url: String },
    /// Replay the same events for every request
    Scripted {
        #[serde(default)]
        events: Vec<ExecutionEvent>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SseConfig {
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

/// Infers a base URL from a bind address.
///
/// This handles common bind address patterns:
/// - `0.0.0.0:PORT` → `http://localhost:PORT`
/// - `127.0.0.1:PORT` → `http://localhost:PORT`
/// - `localhost:PORT` → `http://localhost:PORT`
/// - `HOST:PORT` → `http://HOST:PORT`
/// - `PORT` → `http://localhost:PORT`
pub fn infer_base_url(bind_address: &str) -> String {
    let port = bind_address
        .split(':')
        .next_back()
        .and_then(|p| p.parse::<u16>().ok());

    match (bind_address, port) {
        (addr, Some(port))
            if addr.starts_with("0.0.0.0:")
                || addr.starts_with("127.0.0.1:")
                || addr.starts_with("localhost:")
                || addr == port.to_string() =>
        {
            format!("http://localhost:{port}")
        }
        (_, Some(port)) => {
            let host = bind_address
                .rsplit_once(':')
                .map_or("localhost", |(h, _)| h);
            format!("http://{host}:{port}")
        }
        // No port found → just localhost
        _ => "http://localhost".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_localhost_variants() {
        assert_eq!(infer_base_url("0.0.0.0:8080"), "http://localhost:8080");
        assert_eq!(infer_base_url("127.0.0.1:3000"), "http://localhost:3000");
        assert_eq!(infer_base_url("localhost:9000"), "http://localhost:9000");
        assert_eq!(infer_base_url("8080"), "http://localhost:8080");
    }

    #[test]
    fn keeps_host_when_present() {
        assert_eq!(
            infer_base_url("example.com:7000"),
            "http://example.com:7000"
        );
        assert_eq!(infer_base_url("relay"), "http://localhost");
    }

    #[test]
    fn defaults_are_valid() {
        let config = RelayConfig::default();
        config.validate().unwrap();
        assert_eq!(config.public_base_url(), "http://localhost:8001");
        assert_eq!(config.keep_alive(), Duration::from_secs(15));
        assert_eq!(config.event_source, EventSourceConfig::Echo);
    }

    #[test]
    fn explicit_base_url_wins() {
        let config = RelayConfig {
            base_url: Some("https://relay.example.com/".into()),
            ..RelayConfig::default()
        };
        assert_eq!(config.public_base_url(), "https://relay.example.com");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let empty_bind = RelayConfig {
            bind_address: " ".into(),
            ..RelayConfig::default()
        };
        assert!(empty_bind.validate().is_err());

        let zero_keep_alive = RelayConfig {
            sse: SseConfig { keep_alive_secs: 0 },
            ..RelayConfig::default()
        };
        assert!(zero_keep_alive.validate().is_err());

        let bad_source = RelayConfig {
            event_source: EventSourceConfig::Http { url: String::new() },
            ..RelayConfig::default()
        };
        assert!(bad_source.validate().is_err());

        let bad_upstream = RelayConfig {
            upstream: UpstreamConfig {
                base_url: Some("ftp://agent".into()),
            },
            ..RelayConfig::default()
        };
        assert!(bad_upstream.validate().is_err());
    }
}
