//! Streaming task-update bridge.
//!
//! `taskrelay` consumes the execution events of an agent run (model output,
//! sub-task start and end) and republishes them as ordered task status updates:
//! over the A2A JSON-RPC protocol for agent clients, and as Server-Sent Events
//! for browsers.
//!
//! ```no_run
//! use taskrelay::config::ConfigLoader;
//! use taskrelay::runtime::RelayRuntime;
//!
//! # async fn run() -> Result<(), taskrelay::RelayError> {
//! let config = ConfigLoader::new().load()?;
//! RelayRuntime::from_config(config)?.serve().await
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod runtime;
pub mod sink;
pub mod task;
pub mod translator;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export key error types for easier access
pub use a2a_types as a2a;
pub use errors::{RelayError, RelayResult};
