//! Error types for the kernel.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all kernel operations.
#[derive(Error, Debug)]
pub enum TarkoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A second run was requested while one is in flight.
    #[error("Agent is already executing a task")]
    AlreadyExecuting,

    #[error("Request was aborted")]
    Aborted,

    #[error("Tool \"{0}\" not found")]
    ToolNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid arguments for tool \"{tool_name}\": {message}")]
    ToolArguments { tool_name: String, message: String },

    /// Tool failure; `message` is forwarded to the model unchanged.
    #[error("{message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl TarkoError {
    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::ConfigFile(_) => ErrorCategory::Configuration,
            Self::AlreadyExecuting | Self::InvalidState(_) => ErrorCategory::Concurrency,
            Self::Aborted => ErrorCategory::Aborted,
            Self::ToolNotFound(_)
            | Self::InvalidArgument(_)
            | Self::ToolArguments { .. }
            | Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Provider { .. } | Self::Stream(_) => ErrorCategory::Provider,
            Self::Parse(_) | Self::Serialization(_) => ErrorCategory::Parse,
            Self::Io(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout | ErrorCategory::Provider
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Concurrency => RecoverySuggestion::WaitForIdle,
            ErrorCategory::Aborted => RecoverySuggestion::None,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Provider => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Parse | ErrorCategory::Unknown => RecoverySuggestion::ReportIssue,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TarkoError>;
