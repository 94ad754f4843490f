use crate::config::{EventSourceConfig, RelayConfig};
use crate::errors::LoaderError;
use std::path::Path;
use tracing::debug;

/// Path of the configuration file.
pub const CONFIG_PATH_ENV: &str = "TASKRELAY_CONFIG";
/// Overrides `bind_address`.
pub const BIND_ENV: &str = "TASKRELAY_BIND";
/// Overrides `base_url`.
pub const BASE_URL_ENV: &str = "TASKRELAY_BASE_URL";
/// Overrides `upstream.base_url`.
pub const UPSTREAM_BASE_URL_ENV: &str = "A2A_BASE_URL";
/// Switches the event source to HTTP at the given URL.
pub const EVENT_SOURCE_URL_ENV: &str = "TASKRELAY_EVENT_SOURCE_URL";

/// Loads [`RelayConfig`] from YAML/JSON and the environment.
///
/// Environment variables are read through a resolver so callers (and tests) can
/// substitute their own lookup.
pub struct ConfigLoader<F = fn(&str) -> Option<String>> {
    resolve_env: F,
}

fn std_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

impl ConfigLoader {
    /// Create a loader backed by `std::env`
    pub fn new() -> Self {
        Self {
            resolve_env: std_env,
        }
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<RelayConfig, LoaderError> {
        let config: RelayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<RelayConfig, LoaderError> {
        let config: RelayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<RelayConfig, LoaderError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Create a loader with a custom environment resolver
    pub fn with_env_resolver(resolve_env: F) -> Self {
        Self { resolve_env }
    }

    /// Loads the file named by `TASKRELAY_CONFIG` (or defaults), then applies
    /// environment overrides.
    pub fn load(&self) -> Result<RelayConfig, LoaderError> {
        let base = match (self.resolve_env)(CONFIG_PATH_ENV) {
            Some(path) => {
                debug!(path = %path, "loading configuration file");
                ConfigLoader::from_file(path)?
            }
            None => RelayConfig::default(),
        };
        let config = self.apply_env_overrides(base);
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides on top of `config`.
    pub fn apply_env_overrides(&self, mut config: RelayConfig) -> RelayConfig {
        if let Some(bind) = (self.resolve_env)(BIND_ENV) {
            config.bind_address = bind;
        }
        if let Some(base_url) = (self.resolve_env)(BASE_URL_ENV) {
            config.base_url = Some(base_url);
        }
        if let Some(upstream) = (self.resolve_env)(UPSTREAM_BASE_URL_ENV) {
            config.upstream.base_url = Some(upstream);
        }
        if let Some(url) = (self.resolve_env)(EVENT_SOURCE_URL_ENV) {
            config.event_source = EventSourceConfig::Http { url };
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExecutionEvent;
    use std::collections::HashMap;

    #[test]
    fn parses_yaml_with_scripted_events() {
        let yaml = r#"
bind_address: "0.0.0.0:9000"
event_source:
  type: scripted
  events:
    - event: subtask_start
      name: football-agent
    - event: model_output
      text: "Use a Cover 2"
sse:
  keep_alive_secs: 5
"#;
        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.sse.keep_alive_secs, 5);
        assert_eq!(
            config.event_source,
            EventSourceConfig::Scripted {
                events: vec![
                    ExecutionEvent::subtask_start("football-agent"),
                    ExecutionEvent::model_output("Use a Cover 2"),
                ]
            }
        );
    }

    #[test]
    fn parses_json_and_fills_defaults() {
        let config =
            ConfigLoader::from_json(r#"{"upstream": {"base_url": "http://agent:8001"}}"#).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8001");
        assert_eq!(config.upstream.base_url.as_deref(), Some("http://agent:8001"));
    }

    #[test]
    fn rejects_invalid_documents() {
        assert!(matches!(
            ConfigLoader::from_yaml("sse: {keep_alive_secs: 0}"),
            Err(LoaderError::Validation(_))
        ));
        assert!(matches!(
            ConfigLoader::from_json("{not json"),
            Err(LoaderError::Json(_))
        ));
        assert!(matches!(
            ConfigLoader::from_file("/definitely/not/here.yaml"),
            Err(LoaderError::Io { .. })
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (BIND_ENV, "0.0.0.0:7000"),
            (UPSTREAM_BASE_URL_ENV, "http://remote:8001"),
            (EVENT_SOURCE_URL_ENV, "http://engine:9000/run"),
        ]);
        let loader =
            ConfigLoader::with_env_resolver(|key: &str| env.get(key).map(|v| v.to_string()));

        let config = loader.load().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:7000");
        assert_eq!(config.upstream.base_url.as_deref(), Some("http://remote:8001"));
        assert_eq!(
            config.event_source,
            EventSourceConfig::Http {
                url: "http://engine:9000/run".into()
            }
        );
        assert_eq!(config.public_base_url(), "http://localhost:7000");
    }

    #[test]
    fn invalid_override_fails_validation() {
        let loader = ConfigLoader::with_env_resolver(|key: &str| {
            (key == UPSTREAM_BASE_URL_ENV).then(|| "not-a-url".to_string())
        });
        assert!(matches!(loader.load(), Err(LoaderError::Validation(_))));
    }
}
