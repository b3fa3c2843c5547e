//! Lifecycle hooks around the run loop.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TarkoError;
use crate::event_stream::{AssistantMessage, Event, EventPayload, EventStream, ToolResult};

/// What a hook sees of the current run.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub session_id: String,
    /// One-based iteration number; zero for `on_agent_loop_end` before the
    /// first iteration.
    pub iteration: usize,
    pub events: EventStream,
    pub cancel: CancellationToken,
}

impl HookContext {
    /// Append an event tagged with this run's session.
    pub fn emit(&self, payload: EventPayload) -> Event {
        self.events.emit_in_session(&self.session_id, payload)
    }
}

/// Extension points of the run loop.
///
/// Errors are logged and recorded as `system` events; they never end a run.
#[async_trait]
pub trait AgentHooks: Send + Sync {
    /// Before each model request. Environment state (screenshots) goes here.
    async fn on_each_agent_loop_start(&self, _ctx: &HookContext) -> Result<(), TarkoError> {
        Ok(())
    }

    /// After the tool calls of one turn finished.
    async fn on_after_tool_calls(
        &self,
        _ctx: &HookContext,
        _results: &[ToolResult],
    ) -> Result<(), TarkoError> {
        Ok(())
    }

    /// Once per run with the terminal message.
    async fn on_agent_loop_end(
        &self,
        _ctx: &HookContext,
        _message: &AssistantMessage,
    ) -> Result<(), TarkoError> {
        Ok(())
    }
}
