//! Convenience re-exports for common use.

pub use crate::action_parser::{ActionParser, ActionParserConfig, PredictionParsed, ScreenContext};
pub use crate::agent::{Agent, AgentBuilder, AgentHooks, AgentStatus, HookContext, RunOptions};
pub use crate::config::KernelConfig;
pub use crate::engine::{EngineKind, ToolCallEngine};
pub use crate::error::{Result, TarkoError};
pub use crate::event_stream::{AssistantMessage, Event, EventPayload, EventStream, EventType};
pub use crate::gui::{GuiAgentBuilder, Operator};
pub use crate::provider::{ModelProvider, ProviderRequest};
pub use crate::tools::{FunctionTool, Tool, ToolArguments, ToolParameters};
pub use crate::types::{ChatCompletionChunk, ContentPart, FinishReason, ModelMessage, Role};
