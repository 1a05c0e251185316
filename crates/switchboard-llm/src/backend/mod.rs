//! Backend client abstraction

mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

pub use openai::OpenAiBackend;

use crate::error::LlmError;
use crate::protocol::openai::{ChatChunk, ChatRequest, ChatResponse};

/// Decoded backend chunks in arrival order
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>>;

/// An OpenAI-compatible chat-completions endpoint
///
/// Implementations never retry; a failed call is reported once.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send a request and wait for the complete reply
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Send a streaming request
    ///
    /// Resolves once the backend has accepted the request; chunks are then
    /// pulled lazily from the returned stream.
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError>;
}
