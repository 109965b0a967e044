use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::result::ToolResult;
use crate::error::LlmError;

/// Key under which unparseable tool-call argument text is preserved
pub const RAW_ARGUMENTS_KEY: &str = "_raw_arguments";

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool result
    Tool,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    #[serde(default)]
    pub content: Content,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// ID of the tool call this message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The tool failed and `content` describes the failure
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    fn new(role: Role, content: Content) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            is_error: false,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    /// User message made of text and image parts
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::new(Role::User, Content::Parts(parts))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Text(text.into()))
    }

    /// Assistant turn that requests tool calls
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, Content::Text(text.into()))
        }
    }

    /// Tool output bound to the call that requested it
    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::new(Role::Tool, Content::Text(content.into()))
        }
    }

    /// Tool message carrying an executor outcome, failures included
    pub fn tool_result(result: &ToolResult) -> Self {
        Self {
            is_error: result.is_error(),
            ..Self::tool(&result.tool_call_id, &result.name, result.content_text())
        }
    }

    /// Whether any content part references an image
    pub fn has_images(&self) -> bool {
        self.content.has_images()
    }

    /// Check the structural invariants of this turn
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a tool message lacks its call id,
    /// a non-assistant message carries tool calls, or tool call ids repeat
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.role == Role::Tool && self.tool_call_id.as_deref().is_none_or(str::is_empty) {
            return Err(LlmError::configuration("tool message must carry a tool_call_id"));
        }

        if self.tool_calls.is_empty() {
            return Ok(());
        }

        if self.role != Role::Assistant {
            return Err(LlmError::configuration(format!(
                "{} message cannot carry tool calls",
                self.role.as_str()
            )));
        }

        let mut seen = HashSet::new();
        for call in &self.tool_calls {
            if call.id.is_empty() {
                return Err(LlmError::configuration("tool call id must not be empty"));
            }
            if !seen.insert(call.id.as_str()) {
                return Err(LlmError::configuration(format!("duplicate tool call id: {}", call.id)));
            }
        }

        Ok(())
    }
}

/// Message content, either plain text or structured parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Array of content parts (text, images)
    Parts(Vec<ContentPart>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Content {
    /// Extract text content, joining parts if necessary
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn has_images(&self) -> bool {
        matches!(self, Self::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::Image { .. })))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

/// Individual part within a multipart message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// Image reference
    Image {
        /// URL or base64 data URI for the image
        url: String,
        /// Detail level hint (e.g. "auto", "low", "high")
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image {
            url: url.into(),
            detail: None,
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Vendor- or gateway-assigned identifier
    pub id: String,
    /// Normalized tool name
    pub name: String,
    /// Parsed arguments
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Raw argument text the vendor sent, when it could not be parsed
    pub fn raw_arguments(&self) -> Option<&str> {
        self.arguments.get(RAW_ARGUMENTS_KEY).and_then(Value::as_str)
    }

    /// Arguments re-encoded as a JSON string
    ///
    /// Unparseable vendor text is echoed back verbatim.
    pub fn arguments_json(&self) -> String {
        if let Some(raw) = self.raw_arguments()
            && self.arguments.len() == 1
        {
            return raw.to_owned();
        }
        Value::Object(self.arguments.clone()).to_string()
    }
}

/// Parse JSON-encoded tool arguments
///
/// Empty text yields an empty map. Text that is not a JSON object is kept
/// under [`RAW_ARGUMENTS_KEY`] instead of failing.
pub fn parse_arguments(raw: &str) -> Map<String, Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Map::new();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) => Map::new(),
        Ok(_) | Err(_) => {
            tracing::debug!(arguments = %raw, "tool call arguments are not a JSON object");
            raw_arguments_map(raw)
        }
    }
}

/// Normalize structured tool arguments (Anthropic `input`, Google `args`)
pub fn arguments_from_value(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        Value::String(text) => parse_arguments(&text),
        other => raw_arguments_map(&other.to_string()),
    }
}

fn raw_arguments_map(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(RAW_ARGUMENTS_KEY.to_owned(), Value::String(raw.to_owned()));
    map
}
