//! Engine for providers with structured tool calling.

use super::{
    non_empty, system_and_history, EngineKind, ParsedModelResponse, RequestContext,
    StreamChunkResult, StreamProcessingState, ToolCallEngine, ToolCallUpdate,
};
use crate::event_stream::{AssistantMessage, ToolResult};
use crate::provider::{ProviderRequest, ToolDefinition};
use crate::types::{ChatCompletionChunk, ContentPart, FinishReason, ModelMessage, Role};

/// Sends tool definitions with the request and assembles streamed
/// `delta.tool_calls[]` fragments by index.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ToolCallEngine for NativeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Native
    }

    fn prepare_system_prompt(&self, instructions: &str, _tools: &[ToolDefinition]) -> String {
        instructions.to_string()
    }

    fn prepare_request(&self, context: RequestContext) -> ProviderRequest {
        let messages = system_and_history(&context);
        ProviderRequest {
            model: context.model,
            messages,
            settings: context.settings,
            tools: (!context.tools.is_empty()).then_some(context.tools),
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

        for delta in &chunk.delta.tool_calls {
            let (call, created) = state.tool_call_slot(delta.index);
            if let Some(id) = &delta.id {
                call.id.clone_from(id);
            }
            if let Some(name) = &delta.name {
                call.name.clone_from(name);
            }
            if created && call.id.is_empty() {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
            let arguments_delta = delta.arguments.clone().unwrap_or_default();
            call.arguments.push_str(&arguments_delta);
            result.tool_calls.push(ToolCallUpdate {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments_delta,
            });
        }
        result.has_tool_call_update = !result.tool_calls.is_empty();

        if let Some(reason) = chunk.finish_reason {
            state.finish_reason = Some(reason);
        }
        result
    }

    fn finalize_stream_processing(&self, state: StreamProcessingState) -> ParsedModelResponse {
        let tool_calls: Vec<_> = state
            .tool_calls
            .into_iter()
            .filter(|call| !call.name.is_empty())
            .collect();
        let finish_reason = if tool_calls.is_empty() {
            match state.finish_reason {
                Some(FinishReason::ToolCalls) | None => FinishReason::Stop,
                Some(reason) => reason,
            }
        } else {
            FinishReason::ToolCalls
        };
        ParsedModelResponse {
            content: state.content_buffer,
            raw_content: None,
            reasoning_content: non_empty(state.reasoning_buffer),
            tool_calls,
            finish_reason,
        }
    }

    fn build_historical_assistant_message(&self, message: &AssistantMessage) -> ModelMessage {
        let mut parts = Vec::with_capacity(message.tool_calls.len() + 1);
        if !message.content.is_empty() {
            parts.push(ContentPart::text(message.content.clone()));
        }
        parts.extend(message.tool_calls.iter().cloned().map(ContentPart::ToolCall));
        ModelMessage::with_parts(Role::Assistant, parts)
    }

    fn build_historical_tool_call_result_messages(&self, results: &[ToolResult]) -> Vec<ModelMessage> {
        results
            .iter()
            .map(|result| {
                ModelMessage::tool_result(
                    result.tool_call_id.clone(),
                    result.model_content(),
                    result.is_error(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationSettings, ToolCall, ToolCallDelta};

    fn fragment(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> ChatCompletionChunk {
        ChatCompletionChunk::tool_call(ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: Some(args.to_string()),
        })
    }

    #[test]
    fn assembles_tool_calls_from_fragments() {
        let engine = NativeEngine::new();
        let mut state = engine.init_stream_state();
        engine.process_streaming_chunk(&ChatCompletionChunk::text("Let me check."), &mut state);
        let update = engine.process_streaming_chunk(
            &fragment(0, Some("call_a"), Some("read_file"), "{\"path\":"),
            &mut state,
        );
        assert!(update.has_tool_call_update);
        assert_eq!(update.tool_calls[0].tool_name, "read_file");
        engine.process_streaming_chunk(&fragment(0, None, None, "\"a.txt\"}"), &mut state);
        engine.process_streaming_chunk(&ChatCompletionChunk::finish(FinishReason::ToolCalls), &mut state);

        let parsed = engine.finalize_stream_processing(state);
        assert_eq!(parsed.content, "Let me check.");
        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        assert_eq!(
            parsed.tool_calls,
            vec![ToolCall::new("call_a", "read_file", "{\"path\":\"a.txt\"}")]
        );
    }

    #[test]
    fn plain_text_finishes_with_stop() {
        let engine = NativeEngine::new();
        let mut state = engine.init_stream_state();
        engine.process_streaming_chunk(&ChatCompletionChunk::reasoning("thinking"), &mut state);
        engine.process_streaming_chunk(&ChatCompletionChunk::text("Hi"), &mut state);
        let parsed = engine.finalize_stream_processing(state);
        assert_eq!(parsed.finish_reason, FinishReason::Stop);
        assert_eq!(parsed.reasoning_content.as_deref(), Some("thinking"));
        assert!(parsed.tool_calls.is_empty());
    }

    #[test]
    fn length_finish_reason_is_kept() {
        let engine = NativeEngine::new();
        let mut state = engine.init_stream_state();
        engine.process_streaming_chunk(&ChatCompletionChunk::finish(FinishReason::Length), &mut state);
        assert_eq!(engine.finalize_stream_processing(state).finish_reason, FinishReason::Length);
    }

    #[test]
    fn request_carries_tools_and_system_prompt() {
        let engine = NativeEngine::new();
        let request = engine.prepare_request(RequestContext {
            model: "m".into(),
            system_prompt: "be brief".into(),
            messages: vec![ModelMessage::user("hi")],
            tools: vec![ToolDefinition {
                name: "t".into(),
                description: "d".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            settings: GenerationSettings::default(),
            stream: true,
        });
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.tools.unwrap()[0].name, "t");
    }

    #[test]
    fn history_uses_tool_role_results() {
        let engine = NativeEngine::new();
        let messages = engine.build_historical_tool_call_result_messages(&[ToolResult {
            tool_call_id: "call_a".into(),
            name: "read_file".into(),
            content: serde_json::Value::Null,
            error: Some("boom".into()),
            elapsed_ms: 4,
        }]);
        assert_eq!(messages[0].role, Role::Tool);
        match &messages[0].content[0] {
            ContentPart::ToolResult(part) => {
                assert!(part.is_error);
                assert_eq!(part.content["error"], "boom");
            }
            other => panic!("unexpected part {other:?}"),
        }
    }
}
