//! Tracing setup for the relay binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "taskrelay=debug,tower_http=debug";

/// Installs the global subscriber: an `EnvFilter` from `RUST_LOG` (falling back
/// to `default_filter`) and the `fmt` layer.
///
/// Calling it again is harmless; only the first subscriber is kept.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
