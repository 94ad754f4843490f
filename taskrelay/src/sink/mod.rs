//! Client-facing renderings of task updates.
//!
//! - [`rpc`] - `(Task, Option<update>)` streams, local and remote connectors
//! - [`sse`] - browser frames for `/api/stream`

pub mod rpc;
pub mod sse;

pub use rpc::{
    describe_update, task_updates, LocalConnector, RemoteConnector, TaskConnection, TaskUpdate,
    TaskUpdateStream, UpstreamConnector,
};
pub use sse::{relay_frames, SseEncoder, SseFrame};
