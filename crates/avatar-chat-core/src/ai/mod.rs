pub mod ndjson;
pub mod ollama;

pub use ollama::OllamaClient;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::ChatError;
use crate::state::ChatMessage;

/// Text pieces of one streamed answer, in arrival order.
pub type PieceStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// A language-model endpoint that streams its answers.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends the request and resolves once the response headers are in.
    ///
    /// A non-success status is an error here; failures while reading the body
    /// arrive through the returned stream.
    async fn open_chat(&self, model: &str, messages: &[ChatMessage]) -> Result<PieceStream, ChatError>;
}
