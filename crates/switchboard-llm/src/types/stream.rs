use serde::{Deserialize, Serialize};

use super::message::ToolCall;
use super::response::{FinishReason, Usage};
use super::result::ToolResult;

/// Canonical incremental unit parsed from one vendor stream event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Partial tool calls, keyed by index
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
    /// Present on the chunk that ends generation
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    /// Vendor signalled end of stream
    #[serde(default)]
    pub complete: bool,
    /// Parse or vendor error carried in-band
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Token usage, usually on the final chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Terminal marker chunk
    pub fn done() -> Self {
        Self {
            complete: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Whether the chunk carries nothing worth delivering
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.tool_calls.is_empty()
            && self.finish_reason.is_none()
            && !self.complete
            && self.error.is_none()
            && self.usage.is_none()
    }
}

/// Fragment of a tool call being streamed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call this fragment belongs to
    pub index: u32,
    /// Call identifier (usually first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name (usually first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JSON argument text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// The fragment is the entire call and never continues an earlier one,
    /// even when the vendor reuses its index
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub whole: bool,
}

/// Lifecycle of one streamed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Streaming,
    Complete,
    Errored,
    Cancelled,
}

impl StreamState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Errored | Self::Cancelled)
    }
}

/// Aggregate of a finished stream, handed to `on_complete` and returned by `collect`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Concatenated text of every delivered chunk
    pub content: String,
    /// Fully assembled tool calls in index order
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
    /// In-band errors observed along the way
    pub errors: Vec<String>,
    /// Final state
    pub state: StreamState,
    /// Set when the caller cancelled the stream
    pub cancelled: bool,
}

impl From<StreamSummary> for super::response::ChatResponse {
    fn from(summary: StreamSummary) -> Self {
        Self {
            content: summary.content,
            tool_calls: summary.tool_calls,
            finish_reason: summary.finish_reason,
            usage: summary.usage,
            id: None,
            model: None,
        }
    }
}

/// Item yielded by a normalized stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental content delta
    Delta(StreamChunk),
    /// A tool call finished assembling
    ToolCall(ToolCall),
    /// A tool call was executed during an automatic tool loop
    ToolResult(ToolResult),
    /// Parse or transport error; the stream may continue
    Error(String),
    /// Stream has ended
    Done(StreamSummary),
}
