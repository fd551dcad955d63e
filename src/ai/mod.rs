//! AI module for localchat
//!
//! Everything that touches the completion endpoint lives here.
//!
//! # Architecture
//!
//! - `client` - Wire types, the `ChatBackend` seam and the reqwest-backed `HttpBackend`
//! - `sse` - Incremental decoder for streamed `data:` frames
//!
//! # Usage
//!
//! ```rust,no_run
//! use localchat::ai::{ChatBackend, ChatRequest, HttpBackend};
//! use localchat::types::ChatMessage;
//!
//! # async fn example() -> localchat::ai::ChatResult<()> {
//! let backend = HttpBackend::new("http://localhost:5000/api/chat");
//! let _reply = backend
//!     .complete(&ChatRequest {
//!         model: None,
//!         messages: vec![ChatMessage::user("Hello!")],
//!         temperature: 0.7,
//!         max_tokens: 500,
//!         reasoning_effort: None,
//!         chat_template_kwargs: None,
//!         stream: false,
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod sse;

// Re-export main types
pub use client::{
    ByteStream, ChatBackend, ChatError, ChatRequest, ChatResult, HttpBackend, TemplateKwargs,
    detect_model, parse_completion,
};
pub use sse::{StreamDecoder, StreamEvent, StreamReader};
