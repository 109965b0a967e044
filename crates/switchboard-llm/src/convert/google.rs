//! Conversion between canonical types and the `generateContent` wire format

use std::collections::HashMap;

use serde_json::{Value, json};

use super::anthropic::split_data_uri;
use crate::error::LlmError;
use crate::protocol::google::{
    Blob, CallingMode, Content, FunctionCall, FunctionCallingConfig, FunctionDeclaration, FunctionResponse,
    GenerateContentResponse, Part, ReceivedPart, ToolConfig, UsageMetadata,
};
use crate::tools::normalize_tool_name;
use crate::tools::schema::{GOOGLE_UNSUPPORTED_KEYWORDS, strip_keywords};
use crate::types::result::now_millis;
use crate::types::{
    ChatResponse, Content as MessageContent, ContentPart, FinishReason, Message, Role, StreamChunk, ToolCall,
    ToolCallDelta, ToolChoice, ToolDefinition, ToolResult, Usage, arguments_from_value,
};

const PROVIDER: &str = "google";
const FUNCTION_ROLE: &str = "function";

/// Non-system messages as contents
///
/// Consecutive tool messages merge into one `function` turn. Google keys
/// responses by function name, which comes from the assistant turn that
/// issued the call, falling back to the tool message's own `name`.
pub fn contents(messages: &[Message]) -> Result<Vec<Content>, LlmError> {
    let mut names_by_id: HashMap<&str, &str> = HashMap::new();
    let mut out: Vec<Content> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => {}
            Role::User => out.push(Content {
                role: "user",
                parts: parts(msg)?,
            }),
            Role::Assistant => {
                names_by_id.extend(msg.tool_calls.iter().map(|call| (call.id.as_str(), call.name.as_str())));

                let mut parts = parts(msg)?;
                parts.extend(msg.tool_calls.iter().map(|call| {
                    Part::FunctionCall(FunctionCall {
                        name: call.name.clone(),
                        args: Value::Object(call.arguments.clone()),
                    })
                }));
                out.push(Content { role: "model", parts });
            }
            Role::Tool => {
                let call_id = msg.tool_call_id.as_deref().unwrap_or_default();
                let name = names_by_id
                    .get(call_id)
                    .copied()
                    .or(msg.name.as_deref().filter(|name| !name.is_empty()))
                    .ok_or_else(|| {
                        LlmError::configuration(format!("cannot resolve function name for tool call {call_id}"))
                    })?;

                let part = Part::FunctionResponse(FunctionResponse {
                    name: name.to_owned(),
                    response: if msg.is_error {
                        json!({ "error": msg.content.as_text() })
                    } else {
                        response_object(&msg.content.as_text())
                    },
                });

                match out.last_mut() {
                    Some(last) if last.role == FUNCTION_ROLE => last.parts.push(part),
                    _ => out.push(Content {
                        role: FUNCTION_ROLE,
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    Ok(out)
}

fn parts(msg: &Message) -> Result<Vec<Part>, LlmError> {
    match &msg.content {
        MessageContent::Text(text) if text.is_empty() => Ok(Vec::new()),
        MessageContent::Text(text) => Ok(vec![Part::Text(text.clone())]),
        MessageContent::Parts(parts) => parts.iter().map(part).collect(),
    }
}

fn part(part: &ContentPart) -> Result<Part, LlmError> {
    match part {
        ContentPart::Text { text } => Ok(Part::Text(text.clone())),
        ContentPart::Image { url, .. } => {
            let (mime_type, data) = split_data_uri(url).ok_or_else(|| LlmError::UnsupportedConversion {
                provider: PROVIDER.to_owned(),
                operation: "image URLs other than base64 data URIs".to_owned(),
            })?;

            Ok(Part::InlineData(Blob {
                mime_type: mime_type.to_owned(),
                data: data.to_owned(),
            }))
        }
    }
}

/// Wrap anything that is not a JSON object as `{"result": ...}`
fn response_object(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({ "result": other }),
        Err(_) => json!({ "result": text }),
    }
}

fn result_object(result: &ToolResult) -> Value {
    if let Some(error) = result.error() {
        return json!({ "error": error.message });
    }
    match result.result() {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(value) => json!({ "result": value }),
        None => json!({}),
    }
}

/// Every result of one round in a single `function` turn
pub fn tool_results_content(results: &[ToolResult]) -> Content {
    Content {
        role: FUNCTION_ROLE,
        parts: results
            .iter()
            .map(|result| {
                Part::FunctionResponse(FunctionResponse {
                    name: result.name.clone(),
                    response: result_object(result),
                })
            })
            .collect(),
    }
}

impl From<&ToolDefinition> for FunctionDeclaration {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: strip_keywords(&tool.parameters, GOOGLE_UNSUPPORTED_KEYWORDS),
        }
    }
}

pub fn tool_config(choice: &ToolChoice) -> ToolConfig {
    let (mode, allowed_function_names) = match choice {
        ToolChoice::Auto => (CallingMode::Auto, Vec::new()),
        ToolChoice::None => (CallingMode::None, Vec::new()),
        ToolChoice::Required => (CallingMode::Any, Vec::new()),
        ToolChoice::Function(name) => (CallingMode::Any, vec![name.clone()]),
    };

    ToolConfig {
        function_calling_config: FunctionCallingConfig {
            mode,
            allowed_function_names,
        },
    }
}

impl From<UsageMetadata> for Usage {
    fn from(usage: UsageMetadata) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        }
    }
}

/// `functionCall` parts as canonical calls
///
/// Google assigns no call ids, so each gets `{name}_{unix_millis}_{position}`.
pub fn tool_calls(parts: &[ReceivedPart]) -> Vec<ToolCall> {
    let millis = now_millis();

    parts
        .iter()
        .filter_map(|part| part.function_call.as_ref())
        .enumerate()
        .map(|(position, call)| {
            let name = normalize_tool_name(&call.name);
            ToolCall {
                id: format!("{name}_{millis}_{position}"),
                arguments: arguments_from_value(call.args.clone()),
                name,
            }
        })
        .collect()
}

fn text_of(parts: &[ReceivedPart]) -> String {
    parts.iter().filter_map(|part| part.text.as_deref()).collect()
}

/// Google reports STOP even when the turn ends in function calls
fn finish_reason(raw: Option<&str>, has_tool_calls: bool) -> Option<FinishReason> {
    match raw.and_then(FinishReason::parse) {
        Some(FinishReason::Stop) if has_tool_calls => Some(FinishReason::ToolCalls),
        other => other,
    }
}

impl From<GenerateContentResponse> for ChatResponse {
    fn from(resp: GenerateContentResponse) -> Self {
        let mut response = Self {
            usage: resp.usage_metadata.map(Into::into),
            id: resp.response_id,
            model: resp.model_version,
            ..Self::default()
        };

        if let Some(candidate) = resp.candidates.first() {
            response.tool_calls = tool_calls(candidate.parts());
            response.content = text_of(candidate.parts());
            response.finish_reason = finish_reason(candidate.finish_reason.as_deref(), response.has_tool_calls());
        }

        response
    }
}

/// Canonical chunk for one streamed payload
///
/// Function calls arrive whole, so each delta carries id, name and the full
/// arguments at once and is marked `whole`; the index restarts in every
/// payload. Any finish reason ends the stream.
pub fn stream_chunk(resp: GenerateContentResponse) -> StreamChunk {
    let mut chunk = StreamChunk {
        usage: resp.usage_metadata.map(Into::into),
        ..StreamChunk::default()
    };

    let Some(candidate) = resp.candidates.first() else {
        return chunk;
    };

    let calls = tool_calls(candidate.parts());
    let text = text_of(candidate.parts());

    chunk.finish_reason = finish_reason(candidate.finish_reason.as_deref(), !calls.is_empty());
    chunk.complete = candidate.finish_reason.is_some();
    chunk.content = (!text.is_empty()).then_some(text);
    chunk.tool_calls = calls
        .into_iter()
        .zip(0u32..)
        .map(|(call, index)| ToolCallDelta {
            index,
            arguments: Some(call.arguments_json()),
            id: Some(call.id),
            name: Some(call.name),
            whole: true,
        })
        .collect();

    chunk
}
