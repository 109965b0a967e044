use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of running one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the call this result answers
    pub tool_call_id: String,
    /// Normalized tool name
    pub name: String,
    /// Success payload or error, never both
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    /// Wall-clock handler time in milliseconds
    pub execution_time_ms: u64,
    /// Completion time as unix milliseconds
    pub timestamp: u64,
}

/// Exactly one of `result` or `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    /// Handler returned a value
    Result(Value),
    /// Call failed
    Error(ToolError),
}

/// Human-readable failure with its originating category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub message: String,
    pub kind: ToolErrorKind,
}

/// Where a tool call failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No tool registered under the name
    NotFound,
    /// Tool has no handler bound
    MissingHandler,
    /// Arguments did not match the tool's schema
    InvalidArguments,
    /// Handler returned an error
    Handler,
    /// Handler lost the race against the timeout
    Timeout,
    /// Execution was cancelled
    Cancelled,
    /// Handler panicked
    Panicked,
}

impl ToolErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::MissingHandler => "missing_handler",
            Self::InvalidArguments => "invalid_arguments",
            Self::Handler => "handler",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
        }
    }
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, name: impl Into<String>, value: Value, elapsed: Duration) -> Self {
        Self::with_outcome(tool_call_id, name, ToolOutcome::Result(value), elapsed)
    }

    pub fn failure(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        kind: ToolErrorKind,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        let error = ToolError {
            message: message.into(),
            kind,
        };
        Self::with_outcome(tool_call_id, name, ToolOutcome::Error(error), elapsed)
    }

    fn with_outcome(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        outcome: ToolOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            outcome,
            execution_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            timestamp: now_millis(),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Result(_))
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Result(value) => Some(value),
            ToolOutcome::Error(_) => None,
        }
    }

    pub const fn error(&self) -> Option<&ToolError> {
        match &self.outcome {
            ToolOutcome::Result(_) => None,
            ToolOutcome::Error(error) => Some(error),
        }
    }

    /// Outcome rendered as text for vendors that take string tool output
    pub fn content_text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Result(Value::String(text)) => text.clone(),
            ToolOutcome::Result(value) => value.to_string(),
            ToolOutcome::Error(error) => format!("Error: {}", error.message),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
