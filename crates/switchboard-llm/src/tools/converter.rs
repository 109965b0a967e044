//! Per-vendor tool definition, tool call, and tool result conversion

use serde_json::{Value, json};

use crate::convert;
use crate::error::LlmError;
use crate::protocol::anthropic::{Block, ToolSpec};
use crate::protocol::google::{FunctionDeclaration, ReceivedPart};
use crate::protocol::mistral::MistralToolCall;
use crate::protocol::openai::FunctionCall;
use crate::types::{ToolCall, ToolDefinition, ToolResult};

use super::schema::{VLLM_UNSUPPORTED_KEYWORDS, strip_keywords};

/// Converts tools between canonical form and one vendor's shapes
pub trait ToolConverter: Send + Sync {
    /// One tool definition in the vendor's shape
    fn format_tool(&self, tool: &ToolDefinition) -> Value;

    /// The vendor's `tools` array
    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        tools.iter().map(|tool| self.format_tool(tool)).collect()
    }

    /// Extract tool calls from a vendor payload fragment
    ///
    /// # Errors
    ///
    /// Returns a parse error when the payload is not shaped like the vendor's tool calls
    fn parse_tool_calls(&self, payload: &Value) -> Result<Vec<ToolCall>, LlmError>;

    /// Messages that hand results back to the model, in the vendor's shape
    fn format_tool_responses(&self, results: &[ToolResult]) -> Vec<Value>;
}

fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Accept either a bare `tool_calls` array or a message object carrying one
fn tool_call_array(payload: &Value) -> Result<Value, LlmError> {
    match payload {
        Value::Array(_) => Ok(payload.clone()),
        Value::Object(map) => Ok(map.get("tool_calls").cloned().unwrap_or_else(|| json!([]))),
        _ => Err(LlmError::Parse("expected tool_calls array or message object".to_owned())),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiConverter;

impl ToolConverter for OpenAiConverter {
    fn format_tool(&self, tool: &ToolDefinition) -> Value {
        to_value(convert::openai::function_tool(tool, tool.parameters.clone()))
    }

    fn parse_tool_calls(&self, payload: &Value) -> Result<Vec<ToolCall>, LlmError> {
        let calls: Vec<FunctionCall> = serde_json::from_value(tool_call_array(payload)?)?;
        Ok(calls.into_iter().map(Into::into).collect())
    }

    fn format_tool_responses(&self, results: &[ToolResult]) -> Vec<Value> {
        results
            .iter()
            .map(|result| to_value(convert::openai::tool_result_message(result)))
            .collect()
    }
}

/// `OpenAI` shapes with parameter schemas cut down for guided decoding
#[derive(Debug, Clone, Copy, Default)]
pub struct VllmConverter;

impl ToolConverter for VllmConverter {
    fn format_tool(&self, tool: &ToolDefinition) -> Value {
        to_value(convert::openai::function_tool(
            tool,
            strip_keywords(&tool.parameters, VLLM_UNSUPPORTED_KEYWORDS),
        ))
    }

    fn parse_tool_calls(&self, payload: &Value) -> Result<Vec<ToolCall>, LlmError> {
        OpenAiConverter.parse_tool_calls(payload)
    }

    fn format_tool_responses(&self, results: &[ToolResult]) -> Vec<Value> {
        OpenAiConverter.format_tool_responses(results)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MistralConverter;

impl ToolConverter for MistralConverter {
    fn format_tool(&self, tool: &ToolDefinition) -> Value {
        OpenAiConverter.format_tool(tool)
    }

    fn parse_tool_calls(&self, payload: &Value) -> Result<Vec<ToolCall>, LlmError> {
        let calls: Vec<MistralToolCall> = serde_json::from_value(tool_call_array(payload)?)?;
        Ok(calls
            .into_iter()
            .enumerate()
            .map(|(position, call)| convert::mistral::tool_call(call, position))
            .collect())
    }

    fn format_tool_responses(&self, results: &[ToolResult]) -> Vec<Value> {
        results
            .iter()
            .map(|result| to_value(convert::mistral::tool_result_message(result)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicConverter;

impl ToolConverter for AnthropicConverter {
    fn format_tool(&self, tool: &ToolDefinition) -> Value {
        to_value(ToolSpec::from(tool))
    }

    /// Accepts a response `content` array or a message object carrying one
    fn parse_tool_calls(&self, payload: &Value) -> Result<Vec<ToolCall>, LlmError> {
        let blocks = match payload {
            Value::Array(_) => payload.clone(),
            Value::Object(map) => map.get("content").cloned().unwrap_or_else(|| json!([])),
            _ => return Err(LlmError::Parse("expected content block array".to_owned())),
        };

        let blocks: Vec<Block> = serde_json::from_value(blocks)?;
        Ok(convert::anthropic::tool_calls(&blocks))
    }

    fn format_tool_responses(&self, results: &[ToolResult]) -> Vec<Value> {
        if results.is_empty() {
            return Vec::new();
        }
        vec![to_value(convert::anthropic::tool_results_message(results))]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleConverter;

impl ToolConverter for GoogleConverter {
    fn format_tool(&self, tool: &ToolDefinition) -> Value {
        to_value(FunctionDeclaration::from(tool))
    }

    /// Google groups every declaration under one tool object
    fn format_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        if tools.is_empty() {
            return Vec::new();
        }
        let declarations: Vec<Value> = tools.iter().map(|tool| self.format_tool(tool)).collect();
        vec![json!({ "functionDeclarations": declarations })]
    }

    /// Accepts a `parts` array or a content object carrying one
    fn parse_tool_calls(&self, payload: &Value) -> Result<Vec<ToolCall>, LlmError> {
        let parts = match payload {
            Value::Array(_) => payload.clone(),
            Value::Object(map) => map.get("parts").cloned().unwrap_or_else(|| json!([])),
            _ => return Err(LlmError::Parse("expected parts array".to_owned())),
        };

        let parts: Vec<ReceivedPart> = serde_json::from_value(parts)?;
        Ok(convert::google::tool_calls(&parts))
    }

    fn format_tool_responses(&self, results: &[ToolResult]) -> Vec<Value> {
        if results.is_empty() {
            return Vec::new();
        }
        vec![to_value(convert::google::tool_results_content(results))]
    }
}
