//! Error classification and recovery hints.

use strum::Display;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Concurrency,
    Aborted,
    ToolExecution,
    Timeout,
    Provider,
    Parse,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckConfiguration,
    WaitForIdle,
    IncreaseTimeout,
    CheckToolImplementation,
    ReportIssue,
    None,
}
