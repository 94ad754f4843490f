//! Relay configuration.
//!
//! A [`RelayConfig`] is read from YAML or JSON and then overridden by
//! environment variables (see [`loader`] for the variable names).

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::*;
