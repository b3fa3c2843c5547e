//! Event envelope and payload types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{ContentPart, FinishReason, ToolCall};

/// Discriminant of an [`EventPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    UserMessage,
    AssistantMessage,
    AssistantStreamingMessage,
    AssistantThinkingMessage,
    AssistantStreamingThinkingMessage,
    AssistantStreamingToolCall,
    ToolCall,
    ToolResult,
    EnvironmentInput,
    System,
    AgentRunStart,
    AgentRunEnd,
}

impl EventType {
    /// Event types only emitted while a run streams.
    pub fn is_streaming(self) -> bool {
        matches!(
            self,
            Self::AssistantStreamingMessage
                | Self::AssistantStreamingThinkingMessage
                | Self::AssistantStreamingToolCall
        )
    }
}

/// One immutable entry of the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Run session that produced the event; `None` for events sent outside a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Concrete event payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    UserMessage(UserMessage),
    AssistantMessage(AssistantMessage),
    AssistantStreamingMessage(StreamingContent),
    AssistantThinkingMessage(ThinkingMessage),
    AssistantStreamingThinkingMessage(StreamingContent),
    AssistantStreamingToolCall(StreamingToolCall),
    ToolCall(ToolCallEvent),
    ToolResult(ToolResult),
    EnvironmentInput(EnvironmentInput),
    System(SystemEvent),
    AgentRunStart(RunStart),
    AgentRunEnd(RunEnd),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::UserMessage(_) => EventType::UserMessage,
            Self::AssistantMessage(_) => EventType::AssistantMessage,
            Self::AssistantStreamingMessage(_) => EventType::AssistantStreamingMessage,
            Self::AssistantThinkingMessage(_) => EventType::AssistantThinkingMessage,
            Self::AssistantStreamingThinkingMessage(_) => {
                EventType::AssistantStreamingThinkingMessage
            }
            Self::AssistantStreamingToolCall(_) => EventType::AssistantStreamingToolCall,
            Self::ToolCall(_) => EventType::ToolCall,
            Self::ToolResult(_) => EventType::ToolResult,
            Self::EnvironmentInput(_) => EventType::EnvironmentInput,
            Self::System(_) => EventType::System,
            Self::AgentRunStart(_) => EventType::AgentRunStart,
            Self::AgentRunEnd(_) => EventType::AgentRunEnd,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserMessage {
    pub content: Vec<ContentPart>,
}

/// Finalized output of one model turn, also the terminal value of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub content: String,
    /// Unprocessed model text, replayed verbatim by text-protocol engines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl AssistantMessage {
    /// Message produced when a run is canceled.
    pub fn aborted() -> Self {
        Self::synthesized("Request was aborted", FinishReason::Abort)
    }

    /// A message not produced by the model.
    pub fn synthesized(content: impl Into<String>, finish_reason: FinishReason) -> Self {
        Self {
            content: content.into(),
            raw_content: None,
            reasoning_content: None,
            tool_calls: Vec::new(),
            finish_reason,
            message_id: new_message_id(),
            elapsed_ms: None,
        }
    }
}

/// Incremental text (content or reasoning) sharing a `message_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingContent {
    pub content: String,
    pub message_id: String,
    #[serde(default)]
    pub is_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThinkingMessage {
    pub content: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments_delta: String,
    pub message_id: String,
    #[serde(default)]
    pub is_complete: bool,
}

/// Emitted by the dispatcher right before a call is looked up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallEvent {
    pub tool_call_id: String,
    pub name: String,
    /// Raw JSON argument text as produced by the model.
    pub arguments: String,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Outcome of one tool call. Exactly one per call id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: serde_json::Value,
    /// Absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Content handed back to the model: the error text on failure.
    pub fn model_content(&self) -> serde_json::Value {
        match &self.error {
            Some(error) if self.content.is_null() => serde_json::json!({ "error": error }),
            _ => self.content.clone(),
        }
    }
}

/// Environment state injected by lifecycle hooks (e.g. a screenshot).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentInput {
    pub content: Vec<ContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SystemLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemEvent {
    pub level: SystemLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStart {
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub streaming: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEnd {
    pub session_id: String,
    pub iterations: usize,
    pub elapsed_ms: u64,
    pub finish_reason: FinishReason,
}

/// Opaque unique id for assistant messages.
pub fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}
