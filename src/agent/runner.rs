//! The run loop: model turn, tool calls, repeat.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;

use super::history::build_history;
use super::hooks::HookContext;
use super::options::RunOptions;
use super::state::ActiveRun;
use super::AgentInner;
use crate::config::debug_enabled;
use crate::engine::{ParsedModelResponse, RequestContext};
use crate::error::TarkoError;
use crate::event_stream::{
    new_message_id, AssistantMessage, EventPayload, RunEnd, RunStart, StreamingContent,
    StreamingToolCall, SystemEvent, SystemLevel, ThinkingMessage, ToolResult, UserMessage,
};
use crate::provider::{ProviderRequest, ToolDefinition};
use crate::tools::ExecutionToolsGuard;
use crate::types::FinishReason;

enum ModelPhaseOutcome {
    Ready {
        parsed: ParsedModelResponse,
        message_id: String,
        elapsed_ms: u64,
    },
    Canceled,
    Failed(TarkoError),
}

struct RunLoop<'a> {
    agent: &'a AgentInner,
    run: &'a ActiveRun,
    session_id: String,
    stream: bool,
    iteration: usize,
}

/// Drive one claimed run to its terminal message.
///
/// Recovered failures (abort, provider errors, the iteration cap) resolve
/// to a synthesized message. The run-scoped tools are removed and the run
/// released before this returns, on every path.
pub(crate) async fn execute(
    agent: Arc<AgentInner>,
    run: ActiveRun,
    tool_scope: ExecutionToolsGuard,
    options: RunOptions,
) -> AssistantMessage {
    let RunOptions {
        input,
        stream,
        session_id,
        ..
    } = options;
    // Dropped before `run`, so the overlay is gone once the agent is released.
    let _tool_scope = tool_scope;
    let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let started = Instant::now();

    let mut run_loop = RunLoop {
        agent: &agent,
        run: &run,
        session_id,
        stream,
        iteration: 0,
    };

    run_loop.emit(EventPayload::AgentRunStart(RunStart {
        session_id: run_loop.session_id.clone(),
        provider: agent.provider.provider_name().to_string(),
        model: agent.provider.model_id().to_string(),
        streaming: stream,
    }));
    if !input.is_empty() {
        run_loop.emit(EventPayload::UserMessage(UserMessage { content: input }));
    }
    if debug_enabled() {
        tracing::debug!(
            session_id = %run_loop.session_id,
            engine = %agent.engine.kind(),
            streaming = stream,
            "agent run started"
        );
    }

    let mut message = run_loop.drive().await;
    if run.is_cancelled() && message.finish_reason != FinishReason::Abort {
        // Aborted after the last turn was recorded.
        message = run_loop.aborted();
    }

    run_loop.after_loop(&message).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    run_loop.emit(EventPayload::AgentRunEnd(RunEnd {
        session_id: run_loop.session_id.clone(),
        iterations: run_loop.iteration,
        elapsed_ms,
        finish_reason: message.finish_reason,
    }));
    if debug_enabled() {
        tracing::debug!(
            session_id = %run_loop.session_id,
            iterations = run_loop.iteration,
            elapsed_ms,
            finish_reason = %message.finish_reason,
            "agent run finished"
        );
    }
    message
}

impl RunLoop<'_> {
    fn emit(&self, payload: EventPayload) {
        self.agent.events.emit_in_session(&self.session_id, payload);
    }

    fn hook_context(&self) -> HookContext {
        HookContext {
            session_id: self.session_id.clone(),
            iteration: self.iteration,
            events: self.agent.events.clone(),
            cancel: self.run.cancel_token().clone(),
        }
    }

    fn record_hook_failure(&self, stage: &str, err: &TarkoError) {
        tracing::warn!(
            session_id = %self.session_id,
            iteration = self.iteration,
            stage,
            error = %err,
            "agent hook failed"
        );
        self.emit(EventPayload::System(SystemEvent {
            level: SystemLevel::Warning,
            message: format!("{stage} hook failed: {err}"),
            details: None,
        }));
    }

    fn aborted(&self) -> AssistantMessage {
        let message = AssistantMessage::aborted();
        self.emit(EventPayload::AssistantMessage(message.clone()));
        message
    }

    async fn drive(&mut self) -> AssistantMessage {
        loop {
            if self.run.is_cancelled() {
                return self.aborted();
            }
            if self.iteration >= self.agent.max_iterations {
                tracing::warn!(
                    session_id = %self.session_id,
                    max_iterations = self.agent.max_iterations,
                    "iteration limit reached"
                );
                let message = AssistantMessage::synthesized(
                    format!(
                        "Reached the maximum of {} iterations",
                        self.agent.max_iterations
                    ),
                    FinishReason::Length,
                );
                self.emit(EventPayload::AssistantMessage(message.clone()));
                return message;
            }
            self.iteration += 1;

            self.before_turn().await;
            if self.run.is_cancelled() {
                return self.aborted();
            }

            let request = self.build_request();
            let (parsed, message_id, elapsed_ms) = match self.model_phase(&request).await {
                ModelPhaseOutcome::Ready {
                    parsed,
                    message_id,
                    elapsed_ms,
                } => (parsed, message_id, elapsed_ms),
                ModelPhaseOutcome::Canceled => return self.aborted(),
                ModelPhaseOutcome::Failed(err) => return self.provider_failure(err),
            };

            if let Some(reasoning) = &parsed.reasoning_content {
                self.emit(EventPayload::AssistantThinkingMessage(ThinkingMessage {
                    content: reasoning.clone(),
                    message_id: message_id.clone(),
                }));
            }
            let message = AssistantMessage {
                content: parsed.content,
                raw_content: parsed.raw_content,
                reasoning_content: parsed.reasoning_content,
                tool_calls: parsed.tool_calls,
                finish_reason: parsed.finish_reason,
                message_id,
                elapsed_ms: Some(elapsed_ms),
            };
            self.emit(EventPayload::AssistantMessage(message.clone()));

            if message.tool_calls.is_empty() {
                return message;
            }

            let results = self
                .agent
                .dispatcher
                .process_tool_calls(&message.tool_calls, &self.session_id, self.run.cancel_token())
                .await;
            if self.run.is_cancelled() {
                return self.aborted();
            }
            self.after_tool_calls(&results).await;
        }
    }

    fn build_request(&self) -> ProviderRequest {
        let engine = self.agent.engine.as_ref();
        let tools: Vec<ToolDefinition> = self
            .agent
            .registry
            .tools()
            .iter()
            .map(|tool| tool.definition())
            .collect();
        let system_prompt = engine.prepare_system_prompt(&self.agent.instructions, &tools);
        let messages = build_history(&self.agent.events.get_events(), engine, self.agent.max_images);
        if debug_enabled() {
            tracing::debug!(
                session_id = %self.session_id,
                iteration = self.iteration,
                messages = messages.len(),
                tools = tools.len(),
                "prepared model request"
            );
        }
        engine.prepare_request(RequestContext {
            model: self.agent.provider.model_id().to_string(),
            system_prompt,
            messages,
            tools,
            settings: self.agent.settings.clone(),
            stream: self.stream,
        })
    }

    async fn model_phase(&self, request: &ProviderRequest) -> ModelPhaseOutcome {
        let cancel = self.run.cancel_token();
        let engine = self.agent.engine.as_ref();
        let started = Instant::now();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ModelPhaseOutcome::Canceled,
            opened = self.agent.provider.create_chat_completion(request, cancel.child_token()) => opened,
        };
        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(err) => return ModelPhaseOutcome::Failed(err),
        };

        let message_id = new_message_id();
        let mut state = engine.init_stream_state();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ModelPhaseOutcome::Canceled,
                next = chunks.next() => next,
            };
            let chunk = match next {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => return ModelPhaseOutcome::Failed(err),
            };
            let update = engine.process_streaming_chunk(&chunk, &mut state);
            if !self.stream {
                continue;
            }
            if !update.reasoning_content.is_empty() {
                self.emit(EventPayload::AssistantStreamingThinkingMessage(StreamingContent {
                    content: update.reasoning_content,
                    message_id: message_id.clone(),
                    is_complete: false,
                }));
            }
            if !update.content.is_empty() {
                self.emit(EventPayload::AssistantStreamingMessage(StreamingContent {
                    content: update.content,
                    message_id: message_id.clone(),
                    is_complete: false,
                }));
            }
            for call in update.tool_calls {
                self.emit(EventPayload::AssistantStreamingToolCall(StreamingToolCall {
                    tool_call_id: call.tool_call_id,
                    tool_name: call.tool_name,
                    arguments_delta: call.arguments_delta,
                    message_id: message_id.clone(),
                    is_complete: false,
                }));
            }
        }

        if self.stream {
            self.emit(EventPayload::AssistantStreamingMessage(StreamingContent {
                content: String::new(),
                message_id: message_id.clone(),
                is_complete: true,
            }));
        }
        let parsed = engine.finalize_stream_processing(state);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if debug_enabled() {
            tracing::debug!(
                session_id = %self.session_id,
                iteration = self.iteration,
                tool_calls = parsed.tool_calls.len(),
                finish_reason = %parsed.finish_reason,
                elapsed_ms,
                "model turn finished"
            );
        }
        ModelPhaseOutcome::Ready {
            parsed,
            message_id,
            elapsed_ms,
        }
    }

    fn provider_failure(&self, err: TarkoError) -> AssistantMessage {
        tracing::warn!(
            session_id = %self.session_id,
            iteration = self.iteration,
            error = %err,
            retryable = err.is_retryable(),
            "model request failed"
        );
        self.run.fail();
        self.emit(EventPayload::System(SystemEvent {
            level: SystemLevel::Error,
            message: err.to_string(),
            details: Some(serde_json::json!({ "category": err.category().to_string() })),
        }));
        let message = AssistantMessage::synthesized(err.to_string(), FinishReason::Error);
        self.emit(EventPayload::AssistantMessage(message.clone()));
        message
    }

    async fn before_turn(&self) {
        let ctx = self.hook_context();
        for hook in &self.agent.hooks {
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return,
                outcome = hook.on_each_agent_loop_start(&ctx) => outcome,
            };
            if let Err(err) = outcome {
                self.record_hook_failure("on_each_agent_loop_start", &err);
            }
        }
    }

    async fn after_tool_calls(&self, results: &[ToolResult]) {
        let ctx = self.hook_context();
        for hook in &self.agent.hooks {
            if let Err(err) = hook.on_after_tool_calls(&ctx, results).await {
                self.record_hook_failure("on_after_tool_calls", &err);
            }
        }
    }

    async fn after_loop(&self, message: &AssistantMessage) {
        let ctx = self.hook_context();
        for hook in &self.agent.hooks {
            if let Err(err) = hook.on_agent_loop_end(&ctx, message).await {
                self.record_hook_failure("on_agent_loop_end", &err);
            }
        }
    }
}
