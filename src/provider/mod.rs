//! Model provider boundary.
//!
//! The kernel only needs a chat completion that yields chunks exposing
//! `delta.content`, `delta.tool_calls[]` and `finish_reason`. Non-streaming
//! backends return a single-chunk stream.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::TarkoError;
use crate::types::{ChatCompletionChunk, GenerationSettings, ModelMessage};

/// A request sent to a model provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub settings: GenerationSettings,
    /// Native tool definitions; `None` for text-protocol engines.
    pub tools: Option<Vec<ToolDefinition>>,
    pub stream: bool,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Stream of completion chunks.
pub type ChunkStream = BoxStream<'static, Result<ChatCompletionChunk, TarkoError>>;

/// Core trait implemented by model backends.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "openai", "mock").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// Start a chat completion.
    ///
    /// `cancel` fires when the run is aborted; implementations should stop
    /// producing chunks once it does.
    async fn create_chat_completion(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, TarkoError>;
}
