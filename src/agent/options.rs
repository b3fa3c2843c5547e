//! Per-run options.

use std::fmt;
use std::sync::Arc;

use crate::tools::Tool;
use crate::types::ContentPart;

/// Input and settings for one [`Agent::run`](super::Agent::run).
#[derive(Clone, Default)]
pub struct RunOptions {
    /// User input appended as a `user_message` event.
    pub input: Vec<ContentPart>,
    /// Tools visible only for this run, shadowing permanent tools by name.
    pub tools: Option<Vec<Arc<dyn Tool>>>,
    /// Emit streaming events and request a streamed response.
    pub stream: bool,
    /// Session id used for events and tool contexts. Generated when absent.
    pub session_id: Option<String>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("input", &self.input)
            .field(
                "tools",
                &self
                    .tools
                    .as_ref()
                    .map(|tools| tools.iter().map(|t| t.name().to_string()).collect::<Vec<_>>()),
            )
            .field("stream", &self.stream)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl RunOptions {
    pub fn new(input: impl Into<String>) -> Self {
        Self::with_parts(vec![ContentPart::text(input)])
    }

    pub fn with_parts(input: Vec<ContentPart>) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

impl From<&str> for RunOptions {
    fn from(input: &str) -> Self {
        Self::new(input)
    }
}

impl From<String> for RunOptions {
    fn from(input: String) -> Self {
        Self::new(input)
    }
}
