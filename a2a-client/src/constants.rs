//! Constants for the A2A client

/// Path of the JSON-RPC endpoint, relative to the agent base URL
pub const RPC_PATH: &str = "rpc";

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = a2a_types::JSONRPC_VERSION;

/// Content type every streaming response must carry
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
