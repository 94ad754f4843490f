use taskrelay::config::ConfigLoader;
use taskrelay::runtime::logging::{init_tracing, DEFAULT_LOG_FILTER};
use taskrelay::runtime::RelayRuntime;
use taskrelay::RelayResult;

#[tokio::main]
async fn main() -> RelayResult<()> {
    init_tracing(DEFAULT_LOG_FILTER);

    let config = ConfigLoader::new().load()?;
    tracing::debug!(?config, "configuration loaded");

    RelayRuntime::from_config(config)?.serve().await
}
