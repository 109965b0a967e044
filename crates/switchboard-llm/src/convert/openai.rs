//! Conversion between canonical types and the Chat Completions wire format

use serde_json::{Value, json};

use crate::protocol::openai::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, ContentBlock, FunctionCall, FunctionKind, FunctionSpec,
    FunctionTool, ImageRef, Invocation, MessageContent, TokenUsage,
};
use crate::tools::normalize_tool_name;
use crate::types::{
    ChatResponse, Content, ContentPart, FinishReason, Message, ResponseFormat, StreamChunk, ToolCall, ToolCallDelta,
    ToolChoice, ToolDefinition, ToolResult, Usage, parse_arguments,
};

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        let content = match &msg.content {
            Content::Text(text) if text.is_empty() && !msg.tool_calls.is_empty() => None,
            Content::Text(text) => Some(MessageContent::Text(text.clone())),
            Content::Parts(parts) => Some(MessageContent::Blocks(parts.iter().map(content_block).collect())),
        };

        Self {
            role: msg.role.as_str(),
            content,
            name: msg.name.clone(),
            tool_calls: msg.tool_calls.iter().map(Into::into).collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

fn content_block(part: &ContentPart) -> ContentBlock {
    match part {
        ContentPart::Text { text } => ContentBlock::Text { text: text.clone() },
        ContentPart::Image { url, detail } => ContentBlock::ImageUrl {
            image_url: ImageRef {
                url: url.clone(),
                detail: detail.clone(),
            },
        },
    }
}

impl From<&ToolCall> for FunctionCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: FunctionKind::Function,
            function: Invocation {
                name: call.name.clone(),
                arguments: call.arguments_json(),
            },
        }
    }
}

/// Tool entry carrying `parameters` as given
pub fn function_tool(tool: &ToolDefinition, parameters: Value) -> FunctionTool {
    FunctionTool {
        kind: FunctionKind::Function,
        function: FunctionSpec {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters,
        },
    }
}

/// Tool output as a `tool` role message
pub fn tool_result_message(result: &ToolResult) -> ChatMessage {
    ChatMessage {
        role: "tool",
        content: Some(MessageContent::Text(result.content_text())),
        name: Some(result.name.clone()),
        tool_calls: Vec::new(),
        tool_call_id: Some(result.tool_call_id.clone()),
    }
}

pub fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Function(name) => json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

pub fn response_format_value(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({ "type": "text" }),
        ResponseFormat::JsonObject => json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema { name, schema, strict } => json!({
            "type": "json_schema",
            "json_schema": { "name": name, "schema": schema, "strict": strict }
        }),
    }
}

impl From<FunctionCall> for ToolCall {
    fn from(call: FunctionCall) -> Self {
        Self {
            id: call.id,
            name: normalize_tool_name(&call.function.name),
            arguments: parse_arguments(&call.function.arguments),
        }
    }
}

impl From<TokenUsage> for Usage {
    fn from(usage: TokenUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

impl From<ChatCompletion> for ChatResponse {
    fn from(completion: ChatCompletion) -> Self {
        let mut response = Self {
            usage: completion.usage.map(Into::into),
            id: completion.id,
            model: completion.model,
            ..Self::default()
        };

        // n > 1 is never requested
        if let Some(choice) = completion.choices.into_iter().next() {
            response.content = choice.message.content.unwrap_or_default();
            response.tool_calls = choice.message.tool_calls.into_iter().flatten().map(Into::into).collect();
            response.finish_reason = choice.finish_reason.as_deref().and_then(FinishReason::parse);
        }

        response
    }
}

/// Canonical chunk for one streamed payload
pub fn stream_chunk(chunk: ChatCompletionChunk) -> StreamChunk {
    let mut out = StreamChunk {
        usage: chunk.usage.map(Into::into),
        ..StreamChunk::default()
    };

    let Some(choice) = chunk.choices.into_iter().next() else {
        return out;
    };

    out.content = choice.delta.content;
    out.finish_reason = choice.finish_reason.as_deref().and_then(FinishReason::parse);
    out.tool_calls = choice
        .delta
        .tool_calls
        .into_iter()
        .flatten()
        .map(|fragment| {
            let function = fragment.function.unwrap_or_default();
            ToolCallDelta {
                index: fragment.index,
                id: fragment.id,
                name: function.name.as_deref().map(normalize_tool_name),
                arguments: function.arguments,
                whole: false,
            }
        })
        .collect();

    out
}
