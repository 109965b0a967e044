//! Mistral chat completion API wire format types
//!
//! Close to the `OpenAI` shape, but message content may arrive as either a
//! string or an array of typed chunks, and tool arguments may be either a
//! JSON string or an object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mistral chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralRequest {
    pub model: String,
    pub messages: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    /// Tool choice: "auto", "none", "any", or a function object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

/// Mistral content: plain string or typed chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MistralContent {
    Text(String),
    /// Array of typed chunks
    Chunks(Vec<MistralContentChunk>),
}

impl MistralContent {
    /// Concatenate the text of every text chunk
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Chunks(chunks) => chunks.into_iter().filter_map(|c| c.text).collect(),
        }
    }
}

/// One typed chunk; non-text chunks carry no `text`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralContentChunk {
    /// Chunk type ("text", "image_url", "reference", ...)
    #[serde(rename = "type", default)]
    pub chunk_type: Option<String>,
    /// Text, for text chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Mistral tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralToolCall {
    /// Nine-character alphanumeric identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Position within the message's tool calls (streaming only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub function: MistralFunctionCall,
}

/// Function call details; `arguments` is a JSON string or an object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralFunctionCall {
    #[serde(default)]
    pub name: Option<String>,
    /// Arguments as string or object
    #[serde(default)]
    pub arguments: Value,
}

/// Mistral chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<MistralChoice>,
    #[serde(default)]
    pub usage: Option<MistralUsage>,
}

/// Choice within a Mistral response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralChoice {
    pub message: MistralChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message within a Mistral response choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralChoiceMessage {
    /// Content as string or chunks
    #[serde(default)]
    pub content: Option<MistralContent>,
    #[serde(default)]
    pub tool_calls: Option<Vec<MistralToolCall>>,
}

/// Token usage in a Mistral response
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MistralUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Mistral streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralStreamChunk {
    /// Delta choices
    #[serde(default)]
    pub choices: Vec<MistralStreamChoice>,
    /// Usage on the final chunk
    #[serde(default)]
    pub usage: Option<MistralUsage>,
}

/// Choice within a streaming chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistralStreamChoice {
    #[serde(default)]
    pub delta: MistralStreamDelta,
    /// Finish reason (present on final chunk)
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta content within a streaming choice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MistralStreamDelta {
    /// Incremental content
    #[serde(default)]
    pub content: Option<MistralContent>,
    /// Tool calls (Mistral usually sends each call whole)
    #[serde(default)]
    pub tool_calls: Option<Vec<MistralToolCall>>,
}
