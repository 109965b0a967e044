use serde::{Deserialize, Serialize};

use super::message::ToolCall;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the token limit
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
}

impl FinishReason {
    /// Map any vendor's stop reason onto the canonical set
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stop" | "end_turn" | "stop_sequence" | "STOP" => Some(Self::Stop),
            "length" | "max_tokens" | "model_length" | "MAX_TOKENS" => Some(Self::Length),
            "tool_calls" | "tool_use" | "function_call" => Some(Self::ToolCalls),
            "content_filter" | "refusal" | "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
                Some(Self::ContentFilter)
            }
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Fold a later report into this one
    ///
    /// Streaming vendors split usage across events (input tokens up front,
    /// output tokens at the end), so a zero count never overwrites a known one.
    #[must_use]
    pub fn merge(self, later: Self) -> Self {
        let pick = |earlier: u32, later: u32| if later > 0 { later } else { earlier };
        let prompt_tokens = pick(self.prompt_tokens, later.prompt_tokens);
        let completion_tokens = pick(self.completion_tokens, later.completion_tokens);

        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens
                .saturating_add(completion_tokens)
                .max(later.total_tokens),
        }
    }
}

/// Canonical non-streaming response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated text (empty when the model only called tools)
    pub content: String,
    /// Tool calls requested by the model
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    /// Token usage, when the vendor reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Vendor response identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Model that produced the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
