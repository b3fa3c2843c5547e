//! Prompt-engineered engine that turns free-form GUI predictions into calls.

use std::sync::{Arc, PoisonError, RwLock};

use super::{
    non_empty, system_and_history, EngineKind, ParsedModelResponse, RequestContext,
    StreamChunkResult, StreamProcessingState, ToolCallEngine,
};
use crate::action_parser::{ActionParser, ActionParserConfig, PredictionParsed, ScreenContext};
use crate::event_stream::{AssistantMessage, ToolResult};
use crate::gui::prompt::action_space_prompt;
use crate::provider::{ProviderRequest, ToolDefinition};
use crate::types::{ChatCompletionChunk, ContentPart, FinishReason, ModelMessage, Role, ToolCall};

/// Name of the synthetic tool every parsed GUI action is routed to.
pub const GUI_ACTION_TOOL: &str = "gui_action";

/// How the action body is located in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSyntax {
    /// Full bc/o1 grammar with blank-line separated actions.
    Grammar,
    /// Quote-aware `Action:` marker scan, one action per turn.
    Marker,
}

#[derive(Debug, Default)]
struct ScreenState {
    screen: Option<ScreenContext>,
    scale_factor: Option<f64>,
}

/// Latest screenshot size and device scale factor, written by hooks and read
/// at finalize time.
#[derive(Debug, Clone, Default)]
pub struct SharedScreenContext {
    inner: Arc<RwLock<ScreenState>>,
}

impl SharedScreenContext {
    pub fn set(&self, screen: ScreenContext) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).screen = Some(screen);
    }

    pub fn get(&self) -> Option<ScreenContext> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).screen
    }

    /// Device pixel ratio reported with the latest screenshot. Takes
    /// precedence over the configured parser scale factor.
    pub fn set_scale_factor(&self, scale_factor: f64) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .scale_factor = Some(scale_factor);
    }

    pub fn scale_factor(&self) -> Option<f64> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).scale_factor
    }
}

/// Engine for models that cannot emit structured tool calls.
///
/// Streaming only buffers text; actions are parsed once the response is
/// complete. A `finished` action ends the task and supplies the final
/// message; every other action becomes a [`GUI_ACTION_TOOL`] call.
#[derive(Debug, Clone)]
pub struct GuiEngine {
    syntax: ActionSyntax,
    parser: ActionParser,
    screen: SharedScreenContext,
}

impl GuiEngine {
    pub fn new(syntax: ActionSyntax, config: ActionParserConfig, screen: SharedScreenContext) -> Self {
        Self {
            syntax,
            parser: ActionParser::new(config),
            screen,
        }
    }

    pub fn screen(&self) -> &SharedScreenContext {
        &self.screen
    }

    fn parse_actions(&self, text: &str) -> Vec<PredictionParsed> {
        let screen = self.screen.get();
        let scaled;
        let parser = match self.screen.scale_factor() {
            Some(scale_factor) if scale_factor != self.parser.config().scale_factor => {
                scaled = ActionParser::new(ActionParserConfig {
                    scale_factor,
                    ..self.parser.config().clone()
                });
                &scaled
            }
            _ => &self.parser,
        };
        match self.syntax {
            ActionSyntax::Grammar => parser.parse(text, screen),
            ActionSyntax::Marker => parser.parse_marked(text, screen),
        }
    }
}

fn action_call(action: &PredictionParsed) -> ToolCall {
    let arguments = serde_json::json!({
        "action": action,
        "action_str": action.to_action_string(),
        "thought": action.thought,
    });
    ToolCall::new(
        format!("call_{}", uuid::Uuid::new_v4().simple()),
        GUI_ACTION_TOOL,
        arguments.to_string(),
    )
}

impl ToolCallEngine for GuiEngine {
    fn kind(&self) -> EngineKind {
        match self.syntax {
            ActionSyntax::Grammar => EngineKind::Gui,
            ActionSyntax::Marker => EngineKind::GuiMarker,
        }
    }

    fn prepare_system_prompt(&self, instructions: &str, _tools: &[ToolDefinition]) -> String {
        let action_space = action_space_prompt(self.syntax, self.parser.config().mode);
        if instructions.trim().is_empty() {
            action_space
        } else {
            format!("{instructions}\n\n{action_space}")
        }
    }

    fn prepare_request(&self, context: RequestContext) -> ProviderRequest {
        let messages = system_and_history(&context);
        ProviderRequest {
            model: context.model,
            messages,
            settings: context.settings,
            tools: None,
            stream: context.stream,
        }
    }

    fn process_streaming_chunk(
        &self,
        chunk: &ChatCompletionChunk,
        state: &mut StreamProcessingState,
    ) -> StreamChunkResult {
        let mut result = StreamChunkResult::default();
        if let Some(content) = &chunk.delta.content {
            state.content_buffer.push_str(content);
            result.content.clone_from(content);
        }
        if let Some(reasoning) = &chunk.delta.reasoning_content {
            state.reasoning_buffer.push_str(reasoning);
            result.reasoning_content.clone_from(reasoning);
        }
        if let Some(reason) = chunk.finish_reason {
            state.finish_reason = Some(reason);
        }
        result
    }

    fn finalize_stream_processing(&self, state: StreamProcessingState) -> ParsedModelResponse {
        let raw = state.content_buffer;
        let actions = self.parse_actions(&raw);
        let finished = actions.iter().find(|action| action.is_finished());
        let tool_calls: Vec<ToolCall> = actions
            .iter()
            .filter(|action| !action.is_finished())
            .map(action_call)
            .collect();

        let content = match (finished, actions.first()) {
            (Some(done), _) => done.action_inputs.content.clone().unwrap_or_default(),
            (None, Some(first)) if !first.thought.is_empty() => first.thought.clone(),
            _ => raw.trim().to_string(),
        };
        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };

        ParsedModelResponse {
            content,
            raw_content: Some(raw),
            reasoning_content: non_empty(state.reasoning_buffer),
            tool_calls,
            finish_reason,
        }
    }

    fn build_historical_assistant_message(&self, message: &AssistantMessage) -> ModelMessage {
        ModelMessage::assistant(
            message
                .raw_content
                .clone()
                .unwrap_or_else(|| message.content.clone()),
        )
    }

    fn build_historical_tool_call_result_messages(&self, results: &[ToolResult]) -> Vec<ModelMessage> {
        results
            .iter()
            .map(|result| {
                let parts = match &result.error {
                    Some(error) => vec![ContentPart::text(format!("Error: {error}"))],
                    None => ContentPart::from_json_content(&result.content),
                };
                let text: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                let mut content = vec![ContentPart::text(text.join(""))];
                content.extend(
                    parts
                        .iter()
                        .filter(|part| matches!(part, ContentPart::Image(_)))
                        .cloned(),
                );
                ModelMessage::with_parts(Role::User, content)
            })
            .collect()
    }
}
