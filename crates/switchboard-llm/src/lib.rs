//! Anthropic Messages API to OpenAI chat-completions translation
//!
//! Routes a requested model to a backend target, transcodes the request,
//! calls the backend, and transcodes the reply back. Streaming replies are
//! re-framed by the bridge so the client always sees a well-formed
//! Anthropic event sequence.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod backend;
pub mod bridge;
pub mod convert;
pub mod error;
#[cfg(feature = "http")]
mod handler;
pub mod protocol;
pub mod routing;
pub mod state;
pub mod tokens;

pub use backend::{Backend, ChunkStream, OpenAiBackend};
pub use error::LlmError;
#[cfg(feature = "http")]
pub use handler::{error_response, llm_router};
pub use routing::{ModelRouter, Provider, RoutingTarget};
pub use state::LlmState;
