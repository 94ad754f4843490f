//! # A2A Protocol Client
//!
//! A client for calling remote A2A (Agent-to-Agent) protocol compliant agents over
//! JSON-RPC 2.0, plus the Server-Sent Events decoder its streaming calls are built on.
//!
//! ## Features
//!
//! - Non-streaming (`message/send`, `tasks/get`, `tasks/cancel`) calls
//! - Streaming (`message/stream`, `tasks/resubscribe`) calls decoded from SSE
//! - Optional bearer authentication
//! - Error handling with detailed error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use a2a_client::A2AClient;
//! use a2a_types::{Message, MessageRole, MessageSendParams};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = A2AClient::new("http://localhost:8001")?;
//!
//! let params = MessageSendParams {
//!     message: Message::text(MessageRole::User, "msg_123", "Hello!"),
//!     configuration: None,
//!     metadata: None,
//! };
//!
//! let mut events = client.send_streaming_message(params).await?;
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod constants;
pub mod error;
pub mod sse;

pub use client::{A2AClient, StreamingResults};
pub use error::{A2AError, A2AResult};
