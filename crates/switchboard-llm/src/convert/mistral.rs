//! Conversion between canonical types and the Mistral wire format
//!
//! Outbound messages reuse the `OpenAI` shapes with tool call ids rewritten
//! to the nine-character alphanumeric form Mistral insists on.

use serde_json::{Value, json};

use crate::protocol::mistral::{MistralResponse, MistralStreamChunk, MistralToolCall, MistralUsage};
use crate::protocol::openai::ChatMessage;
use crate::tools::normalize_tool_name;
use crate::types::{
    ChatResponse, FinishReason, Message, StreamChunk, ToolCall, ToolCallDelta, ToolChoice, ToolResult, Usage,
    arguments_from_value,
};

use super::openai;

const MISTRAL_ID_LEN: usize = 9;

/// Rewrite an id to exactly nine ASCII alphanumerics
///
/// Keeps the trailing alphanumeric characters and left-pads with `0`.
pub fn normalize_tool_call_id(id: &str) -> String {
    let alnum: Vec<char> = id.chars().filter(char::is_ascii_alphanumeric).collect();
    let tail = &alnum[alnum.len().saturating_sub(MISTRAL_ID_LEN)..];

    let mut out = String::with_capacity(MISTRAL_ID_LEN);
    out.extend(std::iter::repeat_n('0', MISTRAL_ID_LEN - tail.len()));
    out.extend(tail);
    out
}

// -- Outbound: canonical -> Mistral --

pub fn message(msg: &Message) -> ChatMessage {
    let mut wire = ChatMessage::from(msg);

    for call in &mut wire.tool_calls {
        call.id = normalize_tool_call_id(&call.id);
    }
    wire.tool_call_id = wire.tool_call_id.as_deref().map(normalize_tool_call_id);

    wire
}

pub fn tool_result_message(result: &ToolResult) -> ChatMessage {
    let mut wire = openai::tool_result_message(result);
    wire.tool_call_id = wire.tool_call_id.as_deref().map(normalize_tool_call_id);
    wire
}

/// Mistral spells "required" as "any"
pub fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Required => json!("any"),
        other => openai::tool_choice_value(other),
    }
}

// -- Inbound: Mistral -> canonical --

impl From<MistralUsage> for Usage {
    fn from(usage: MistralUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Convert a Mistral tool call; `position` stands in for a missing id
pub fn tool_call(call: MistralToolCall, position: usize) -> ToolCall {
    let id = call.id.unwrap_or_else(|| position.to_string());

    ToolCall {
        id: normalize_tool_call_id(&id),
        name: normalize_tool_name(call.function.name.as_deref().unwrap_or_default()),
        arguments: arguments_from_value(call.function.arguments),
    }
}

impl From<MistralResponse> for ChatResponse {
    fn from(resp: MistralResponse) -> Self {
        let usage = resp.usage.map(Into::into);

        let Some(choice) = resp.choices.into_iter().next() else {
            return Self {
                usage,
                id: resp.id,
                model: resp.model,
                ..Self::default()
            };
        };

        Self {
            content: choice.message.content.map(|c| c.into_text()).unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(position, call)| tool_call(call, position))
                .collect(),
            finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
            usage,
            id: resp.id,
            model: resp.model,
        }
    }
}

/// Convert a Mistral stream chunk into a canonical chunk
pub fn stream_chunk(chunk: MistralStreamChunk) -> StreamChunk {
    let usage = chunk.usage.map(Into::into);

    let Some(choice) = chunk.choices.into_iter().next() else {
        return StreamChunk {
            usage,
            ..StreamChunk::default()
        };
    };

    let tool_calls = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .zip(0u32..)
        .map(|(call, position)| {
            let index = call.index.unwrap_or(position);
            let arguments = match &call.function.arguments {
                Value::Null => None,
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            };

            ToolCallDelta {
                index,
                id: call.id.as_deref().map(normalize_tool_call_id),
                name: call.function.name.as_deref().map(normalize_tool_name),
                arguments,
                // Without an index nothing can continue this fragment
                whole: call.index.is_none(),
            }
        })
        .collect();

    StreamChunk {
        content: choice.delta.content.map(|c| c.into_text()),
        tool_calls,
        finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
        complete: false,
        error: None,
        usage,
    }
}
