//! Tool-call engines: how tools reach the model and how calls come back.
//!
//! An engine owns prompt and request preparation, folds streamed chunks into
//! a [`StreamProcessingState`], finalizes it into a [`ParsedModelResponse`]
//! and rebuilds provider messages from past turns. The run loop is the same
//! for every engine.

pub mod gui;
pub mod native;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::action_parser::ActionParserConfig;
use crate::event_stream::{AssistantMessage, ToolResult};
use crate::provider::{ProviderRequest, ToolDefinition};
use crate::types::{ChatCompletionChunk, FinishReason, GenerationSettings, ModelMessage, ToolCall};

pub use gui::{ActionSyntax, GuiEngine, SharedScreenContext, GUI_ACTION_TOOL};
pub use native::NativeEngine;

/// Engine selector used by configuration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EngineKind {
    /// Structured tool calls from the provider.
    #[default]
    Native,
    /// Prompt-engineered GUI actions in the bc/o1 grammar.
    Gui,
    /// Prompt-engineered GUI actions located by the `Action:` marker.
    GuiMarker,
}

impl EngineKind {
    /// Build the engine for this kind.
    pub fn build(
        self,
        parser: ActionParserConfig,
        screen: SharedScreenContext,
    ) -> Arc<dyn ToolCallEngine> {
        match self {
            Self::Native => Arc::new(NativeEngine::new()),
            Self::Gui => Arc::new(GuiEngine::new(ActionSyntax::Grammar, parser, screen)),
            Self::GuiMarker => Arc::new(GuiEngine::new(ActionSyntax::Marker, parser, screen)),
        }
    }
}

/// Inputs for one model request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub model: String,
    /// Output of [`ToolCallEngine::prepare_system_prompt`].
    pub system_prompt: String,
    /// Conversation history, oldest first.
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    pub settings: GenerationSettings,
    pub stream: bool,
}

/// Mutable accumulation for one streamed model response.
#[derive(Debug, Clone, Default)]
pub struct StreamProcessingState {
    pub content_buffer: String,
    pub reasoning_buffer: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    // Provider-side fragment index of each entry in `tool_calls`.
    tool_call_indices: Vec<usize>,
}

impl StreamProcessingState {
    /// The call slot for a provider fragment index, created on first sight.
    fn tool_call_slot(&mut self, index: usize) -> (&mut ToolCall, bool) {
        match self.tool_call_indices.iter().position(|i| *i == index) {
            Some(slot) => (&mut self.tool_calls[slot], false),
            None => {
                self.tool_call_indices.push(index);
                self.tool_calls.push(ToolCall::new("", "", ""));
                let last = self.tool_calls.len() - 1;
                (&mut self.tool_calls[last], true)
            }
        }
    }
}

/// A streamed fragment of a tool call, suitable for UI events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallUpdate {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments_delta: String,
}

/// What one chunk contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunkResult {
    pub content: String,
    pub reasoning_content: String,
    pub has_tool_call_update: bool,
    pub tool_calls: Vec<ToolCallUpdate>,
}

/// Engine output for one finished model turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModelResponse {
    pub content: String,
    pub raw_content: Option<String>,
    pub reasoning_content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

/// Pluggable strategy between the run loop and a model.
///
/// `process_streaming_chunk` is called once per chunk and must not have side
/// effects beyond mutating `state`.
pub trait ToolCallEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// System prompt for `instructions` and the visible tools.
    fn prepare_system_prompt(&self, instructions: &str, tools: &[ToolDefinition]) -> String;

    fn prepare_request(&self, context: RequestContext) -> ProviderRequest;

    fn init_stream_state(&self) -> StreamProcessingState {
        StreamProcessingState::default()
    }

    fn process_streaming_chunk(
        &self,
        chunk: &ChatCompletionChunk,
        state: &mut StreamProcessingState,
    ) -> StreamChunkResult;

    fn finalize_stream_processing(&self, state: StreamProcessingState) -> ParsedModelResponse;

    /// Replay a past assistant turn to the provider.
    fn build_historical_assistant_message(&self, message: &AssistantMessage) -> ModelMessage;

    /// Replay tool results of a past turn to the provider.
    fn build_historical_tool_call_result_messages(&self, results: &[ToolResult]) -> Vec<ModelMessage>;
}

fn system_and_history(context: &RequestContext) -> Vec<ModelMessage> {
    let mut messages = Vec::with_capacity(context.messages.len() + 1);
    if !context.system_prompt.trim().is_empty() {
        messages.push(ModelMessage::system(context.system_prompt.clone()));
    }
    messages.extend(context.messages.iter().cloned());
    messages
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
