//! Tool dispatcher: lookup, timing, error classification and events.

use std::time::Instant;

use futures::future;
use tokio_util::sync::CancellationToken;

use crate::config::debug_enabled;
use crate::error::TarkoError;
use crate::event_stream::{EventPayload, EventStream, ToolCallEvent, ToolResult};
use crate::tools::{ToolArguments, ToolExecutionContext, ToolRegistry};
use crate::types::ToolCall;

/// Executes model tool calls against a [`ToolRegistry`].
///
/// Every call produces exactly one `tool_call` and one `tool_result` event.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
    events: EventStream,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, events: EventStream) -> Self {
        Self { registry, events }
    }

    /// The registry calls are resolved against.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Dispatch all calls of one model turn concurrently.
    ///
    /// Results keep the order of `calls`.
    pub async fn process_tool_calls(
        &self,
        calls: &[ToolCall],
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        let futures = calls
            .iter()
            .map(|call| self.execute_tool_call(call, session_id, cancel));
        future::join_all(futures).await
    }

    /// Dispatch one call and emit its events.
    pub async fn execute_tool_call(
        &self,
        call: &ToolCall,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> ToolResult {
        let tool = self.registry.get_tool(&call.name);
        self.events.emit_in_session(
            session_id,
            EventPayload::ToolCall(ToolCallEvent {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
                start_time: chrono::Utc::now().timestamp_millis(),
                description: tool.as_ref().map(|t| t.description().to_string()),
            }),
        );

        let result = match tool {
            None => {
                tracing::warn!(tool = %call.name, tool_call_id = %call.id, "tool not found");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: serde_json::Value::Null,
                    error: Some(TarkoError::ToolNotFound(call.name.clone()).to_string()),
                    elapsed_ms: 0,
                }
            }
            Some(tool) => {
                let started = Instant::now();
                let outcome = match ToolArguments::parse(&call.arguments) {
                    Err(err) => Err(argument_error(&call.name, err)),
                    Ok(args) => {
                        let ctx = ToolExecutionContext {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            session_id: session_id.to_string(),
                            cancel: cancel.child_token(),
                        };
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Err(TarkoError::Aborted),
                            res = tool.execute(&args, &ctx) => res,
                        }
                    }
                };
                let elapsed_ms = elapsed_ms(started);
                match outcome {
                    Ok(content) => ToolResult {
                        tool_call_id: call.id.clone(),
                        name: call.name.clone(),
                        content,
                        error: None,
                        elapsed_ms,
                    },
                    Err(err) => {
                        tracing::warn!(
                            tool = %call.name,
                            tool_call_id = %call.id,
                            elapsed_ms,
                            error = %err,
                            "tool call failed"
                        );
                        ToolResult {
                            tool_call_id: call.id.clone(),
                            name: call.name.clone(),
                            content: serde_json::Value::Null,
                            error: Some(err.to_string()),
                            elapsed_ms,
                        }
                    }
                }
            }
        };

        if debug_enabled() {
            tracing::debug!(
                tool = %result.name,
                tool_call_id = %result.tool_call_id,
                elapsed_ms = result.elapsed_ms,
                is_error = result.is_error(),
                "tool call finished"
            );
        }
        self.events
            .emit_in_session(session_id, EventPayload::ToolResult(result.clone()));
        result
    }
}

fn argument_error(tool_name: &str, err: TarkoError) -> TarkoError {
    let message = match err {
        TarkoError::InvalidArgument(message) => message,
        other => other.to_string(),
    };
    TarkoError::ToolArguments {
        tool_name: tool_name.to_string(),
        message,
    }
}

/// Whole milliseconds, rounded up, never below one once a timer started.
fn elapsed_ms(started: Instant) -> u64 {
    let micros = started.elapsed().as_micros();
    let millis = micros.div_ceil(1000).max(1);
    u64::try_from(millis).unwrap_or(u64::MAX)
}
