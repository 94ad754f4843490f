//! Core runtime components.
//!
//! This module contains the execution machinery behind both client surfaces.
//!
//! # Modules
//!
//! - [`executor`] - Request lifecycle: drives one event source run per task
//! - [`event_bus`] - Per-task fan-out of logged task events
//! - [`error_mapper`] - Relay error to JSON-RPC error conversion
//! - [`status_mapper`] - A2A protocol status conversion utilities

pub mod error_mapper;
pub mod event_bus;
pub mod executor;
pub mod status_mapper;

// Re-export commonly used types
pub use event_bus::{TaskEventBus, TaskEventReceiver};
pub use executor::{ExecutionLink, RequestExecutor};
