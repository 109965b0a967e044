//! Conversion between canonical types and the Messages API wire format

use serde_json::Value;

use crate::protocol::anthropic::{
    Block, BlockDelta, ImageSource, MessagesResponse, StreamEvent, TokenUsage, ToolChoiceMode, ToolSpec, Turn,
};
use crate::tools::normalize_tool_name;
use crate::types::{
    ChatResponse, Content, ContentPart, FinishReason, Message, Role, StreamChunk, ToolCall, ToolCallDelta, ToolChoice,
    ToolDefinition, ToolResult, Usage, arguments_from_value,
};

/// Split a `data:` URI into media type and base64 payload
pub(crate) fn split_data_uri(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    Some((media_type, data))
}

/// Convert one non-system message
///
/// A tool message becomes a user turn holding a single `tool_result` block.
pub fn message(msg: &Message) -> Turn {
    match msg.role {
        Role::Tool => Turn {
            role: "user",
            content: vec![Block::ToolResult {
                tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                content: msg.content.as_text(),
                is_error: msg.is_error.then_some(true),
            }],
        },
        Role::Assistant => {
            let mut content = blocks(&msg.content);
            content.extend(msg.tool_calls.iter().map(|call| Block::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: Value::Object(call.arguments.clone()),
            }));
            Turn {
                role: "assistant",
                content,
            }
        }
        Role::System | Role::User => Turn {
            role: "user",
            content: blocks(&msg.content),
        },
    }
}

/// Empty text is dropped; the API rejects empty text blocks
fn blocks(content: &Content) -> Vec<Block> {
    match content {
        Content::Text(text) if text.is_empty() => Vec::new(),
        Content::Text(text) => vec![Block::Text { text: text.clone() }],
        Content::Parts(parts) => parts.iter().map(part_block).collect(),
    }
}

fn part_block(part: &ContentPart) -> Block {
    match part {
        ContentPart::Text { text } => Block::Text { text: text.clone() },
        ContentPart::Image { url, .. } => Block::Image {
            source: split_data_uri(url).map_or_else(
                || ImageSource::Url { url: url.clone() },
                |(media_type, data)| ImageSource::Base64 {
                    media_type: media_type.to_owned(),
                    data: data.to_owned(),
                },
            ),
        },
    }
}

impl From<&ToolDefinition> for ToolSpec {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.parameters.clone(),
        }
    }
}

/// Every result of one round in a single user turn
pub fn tool_results_message(results: &[ToolResult]) -> Turn {
    let content = results
        .iter()
        .map(|result| Block::ToolResult {
            tool_use_id: result.tool_call_id.clone(),
            content: result
                .error()
                .map_or_else(|| result.content_text(), |error| error.message.clone()),
            is_error: Some(result.is_error()),
        })
        .collect();

    Turn { role: "user", content }
}

/// `None` for [`ToolChoice::None`], which callers express by dropping tools
pub fn tool_choice(choice: &ToolChoice) -> Option<ToolChoiceMode> {
    match choice {
        ToolChoice::None => None,
        ToolChoice::Auto => Some(ToolChoiceMode::Auto),
        ToolChoice::Required => Some(ToolChoiceMode::Any),
        ToolChoice::Function(name) => Some(ToolChoiceMode::Tool { name: name.clone() }),
    }
}

impl From<TokenUsage> for Usage {
    fn from(usage: TokenUsage) -> Self {
        Self::new(usage.input_tokens, usage.output_tokens)
    }
}

/// `tool_use` blocks as canonical calls
pub fn tool_calls(blocks: &[Block]) -> Vec<ToolCall> {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                name: normalize_tool_name(name),
                arguments: arguments_from_value(input.clone()),
            }),
            _ => None,
        })
        .collect()
}

impl From<MessagesResponse> for ChatResponse {
    fn from(resp: MessagesResponse) -> Self {
        let content = resp
            .content
            .iter()
            .filter_map(|block| match block {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        Self {
            content,
            tool_calls: tool_calls(&resp.content),
            finish_reason: resp.stop_reason.as_deref().and_then(FinishReason::parse),
            usage: resp.usage.map(Into::into),
            id: resp.id,
            model: resp.model,
        }
    }
}

fn tool_delta(index: u32, id: Option<String>, name: Option<String>, arguments: Option<String>) -> StreamChunk {
    StreamChunk {
        tool_calls: vec![ToolCallDelta {
            index,
            id,
            name,
            arguments,
            whole: false,
        }],
        ..StreamChunk::default()
    }
}

/// Canonical chunk for one stream event
///
/// The content block index doubles as the tool-call index, so text blocks
/// leave gaps in the index sequence.
pub fn stream_chunk(event: StreamEvent) -> StreamChunk {
    match event {
        StreamEvent::MessageStart { message } => StreamChunk {
            usage: message.usage.map(Into::into),
            ..StreamChunk::default()
        },
        StreamEvent::ContentBlockStart { index, content_block } => match content_block {
            Block::Text { text } if !text.is_empty() => StreamChunk::text(text),
            Block::ToolUse { id, name, input } => {
                // Real input normally arrives as input_json_delta fragments
                let arguments = match input {
                    Value::Object(map) if !map.is_empty() => Some(Value::Object(map).to_string()),
                    _ => None,
                };
                tool_delta(index, Some(id), Some(normalize_tool_name(&name)), arguments)
            }
            _ => StreamChunk::default(),
        },
        StreamEvent::ContentBlockDelta { index, delta } => match delta {
            BlockDelta::TextDelta { text } => StreamChunk::text(text),
            BlockDelta::InputJsonDelta { partial_json } => tool_delta(index, None, None, Some(partial_json)),
            BlockDelta::Unsupported => StreamChunk::default(),
        },
        StreamEvent::MessageDelta { delta, usage } => StreamChunk {
            finish_reason: delta.stop_reason.as_deref().and_then(FinishReason::parse),
            usage: usage.map(Into::into),
            ..StreamChunk::default()
        },
        StreamEvent::MessageStop => StreamChunk::done(),
        StreamEvent::Error { error } => StreamChunk::error(error.message),
        StreamEvent::ContentBlockStop { .. } | StreamEvent::Ping => StreamChunk::default(),
    }
}
