//! Streaming chunk types at the model-provider boundary.

use serde::{Deserialize, Serialize};

use super::generation::FinishReason;

/// One chunk of a streamed chat completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    pub delta: ChunkDelta,
    /// Finish reason (only on the final chunk).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental payload carried by a chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// A fragment of a natively streamed tool call.
///
/// The first fragment for an `index` carries `id` and `name`; later fragments
/// append to `arguments`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ChatCompletionChunk {
    /// A content-only chunk.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            delta: ChunkDelta {
                content: Some(text.into()),
                ..Default::default()
            },
            finish_reason: None,
        }
    }

    /// A reasoning-only chunk.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            delta: ChunkDelta {
                reasoning_content: Some(text.into()),
                ..Default::default()
            },
            finish_reason: None,
        }
    }

    /// A chunk carrying one tool call fragment.
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            delta: ChunkDelta {
                tool_calls: vec![delta],
                ..Default::default()
            },
            finish_reason: None,
        }
    }

    /// The terminal chunk.
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            delta: ChunkDelta::default(),
            finish_reason: Some(reason),
        }
    }
}
