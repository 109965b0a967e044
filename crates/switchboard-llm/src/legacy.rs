//! Compatibility layer for consumers of the old buffer-oriented stream API
//!
//! Older callers fed raw SSE lines in and read back objects shaped like
//! `{content, tool_calls, complete, error, errorMessage, finishReason}`.
//! [`LegacyBridge`] keeps that shape while parsing through the same
//! providers the [`LlmClient`] uses.

use std::pin::Pin;

use futures_util::{Stream, StreamExt, future};
use serde::Serialize;

use crate::client::LlmClient;
use crate::error::LlmError;
use crate::provider::Provider;
use crate::types::{ChatRequest, StreamChunk, StreamEvent, StreamState, ToolCall, ToolCallDelta};

pub type LegacyStream = Pin<Box<dyn Stream<Item = LegacyChunk> + Send>>;

/// One parsed line in the legacy shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyChunk {
    /// Text fragments carried by the line
    pub content: Vec<String>,
    #[serde(rename = "tool_calls")]
    pub tool_calls: Vec<LegacyToolCall>,
    pub complete: bool,
    pub error: bool,
    pub error_message: Option<String>,
    pub finish_reason: Option<String>,
}

/// Tool-call fragment in the `OpenAI` delta shape the old consumer expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyToolCall {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub call_type: &'static str,
    pub function: LegacyFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub arguments: String,
}

impl From<ToolCallDelta> for LegacyToolCall {
    fn from(delta: ToolCallDelta) -> Self {
        Self {
            index: delta.index,
            id: delta.id,
            call_type: "function",
            function: LegacyFunction {
                name: delta.name,
                arguments: delta.arguments.unwrap_or_default(),
            },
        }
    }
}

impl LegacyToolCall {
    /// A fully assembled call, as repeated on the final chunk
    fn assembled(index: u32, call: &ToolCall) -> Self {
        Self {
            index,
            id: Some(call.id.clone()),
            call_type: "function",
            function: LegacyFunction {
                name: Some(call.name.clone()),
                arguments: call.arguments_json(),
            },
        }
    }
}

impl From<StreamChunk> for LegacyChunk {
    fn from(chunk: StreamChunk) -> Self {
        Self {
            content: chunk.content.filter(|text| !text.is_empty()).into_iter().collect(),
            tool_calls: chunk.tool_calls.into_iter().map(Into::into).collect(),
            complete: chunk.complete,
            error: chunk.error.is_some(),
            error_message: chunk.error,
            finish_reason: chunk.finish_reason.map(|reason| reason.as_str().to_owned()),
        }
    }
}

impl LegacyChunk {
    fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.tool_calls.is_empty()
            && !self.complete
            && !self.error
            && self.finish_reason.is_none()
    }
}

/// Adapter from the unified client to the legacy line protocol
#[derive(Clone)]
pub struct LegacyBridge {
    client: LlmClient,
}

impl LegacyBridge {
    pub const fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Parse one raw line from `provider`'s stream
    ///
    /// Accepts bare payloads or SSE `data:` lines. Blank lines, comments,
    /// and `event:` lines yield an empty chunk.
    ///
    /// # Errors
    ///
    /// Returns `ProviderNotFound` when `provider` is not configured
    pub fn parse_line(&self, provider: &str, line: &str) -> Result<LegacyChunk, LlmError> {
        let provider = self.client.provider(provider)?;
        Ok(parse_with(provider.as_ref(), line))
    }

    /// Parse every line of a buffer, dropping lines that carry nothing
    ///
    /// # Errors
    ///
    /// Returns `ProviderNotFound` when `provider` is not configured
    pub fn parse_buffer(&self, provider: &str, buffer: &str) -> Result<Vec<LegacyChunk>, LlmError> {
        let provider = self.client.provider(provider)?;
        Ok(buffer
            .lines()
            .map(|line| parse_with(provider.as_ref(), line))
            .filter(|chunk| !chunk.is_empty())
            .collect())
    }

    /// Stream a request through the client, re-packaged as legacy chunks
    ///
    /// The last item always has `complete` set, with the error flag raised
    /// when the stream failed, and repeats every assembled tool call whole.
    pub async fn stream(&self, request: ChatRequest) -> Result<LegacyStream, LlmError> {
        let stream = self.client.stream(request).await?;

        Ok(Box::pin(stream.filter_map(|event| {
            future::ready(match event {
                StreamEvent::Delta(chunk) => Some(LegacyChunk::from(chunk)),
                StreamEvent::Error(message) => Some(LegacyChunk::from(StreamChunk::error(message))),
                StreamEvent::Done(summary) => {
                    let failed = summary.state == StreamState::Errored;
                    Some(LegacyChunk {
                        complete: true,
                        error: failed,
                        error_message: failed.then(|| summary.errors.last().cloned()).flatten(),
                        finish_reason: summary.finish_reason.map(|reason| reason.as_str().to_owned()),
                        tool_calls: summary
                            .tool_calls
                            .iter()
                            .zip(0u32..)
                            .map(|(call, index)| LegacyToolCall::assembled(index, call))
                            .collect(),
                        content: Vec::new(),
                    })
                }
                // Assembled calls ride on the final chunk instead
                StreamEvent::ToolCall(_) | StreamEvent::ToolResult(_) => None,
            })
        })))
    }
}

fn parse_with(provider: &dyn Provider, line: &str) -> LegacyChunk {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
        return LegacyChunk::default();
    }

    let payload = line.strip_prefix("data:").map_or(line, str::trim_start);
    LegacyChunk::from(provider.parse_stream_chunk(payload))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use switchboard_config::{GatewayConfig, ProviderConfig, ProviderKind};

    use super::*;

    fn bridge() -> LegacyBridge {
        let config = GatewayConfig::default()
            .with_provider("openai", ProviderConfig::new(ProviderKind::Openai).with_api_key("sk"))
            .with_provider("anthropic", ProviderConfig::new(ProviderKind::Anthropic).with_api_key("ak"))
            .with_provider("google", ProviderConfig::new(ProviderKind::Google).with_api_key("gk"));
        LegacyBridge::new(LlmClient::new(&config).unwrap())
    }

    #[test]
    fn done_sentinel_completes() {
        let chunk = bridge().parse_line("openai", "data: [DONE]").unwrap();
        assert!(chunk.complete);
        assert!(!chunk.error);
        assert!(chunk.content.is_empty());
    }

    #[test]
    fn legacy_shape_serializes() {
        let chunk = bridge()
            .parse_line(
                "openai",
                r#"{"choices":[{"delta":{"content":"hi","tool_calls":[{"index":0,"id":"call_1","function":{"name":"math","arguments":"{\"a\""}}]}}]}"#,
            )
            .unwrap();

        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({
                "content": ["hi"],
                "tool_calls": [{
                    "index": 0,
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "math", "arguments": "{\"a\""}
                }],
                "complete": false,
                "error": false,
                "errorMessage": null,
                "finishReason": null
            })
        );
    }

    #[test]
    fn malformed_line_sets_error_flag() {
        let chunk = bridge().parse_line("openai", "data: {broken").unwrap();
        assert!(chunk.error);
        assert!(chunk.error_message.unwrap().contains("malformed stream payload"));
        assert!(!chunk.complete);
    }

    #[test]
    fn buffer_with_anthropic_events() {
        let buffer = concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n",
            "\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n",
            "\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n",
        );

        let chunks = bridge().parse_buffer("anthropic", buffer).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, vec!["Hi".to_owned()]);
        assert_eq!(chunks[1].finish_reason.as_deref(), Some("stop"));
        assert!(chunks[2].complete);
    }

    #[test]
    fn google_finish_is_complete() {
        let chunk = bridge()
            .parse_line(
                "google",
                r#"data: {"candidates":[{"content":{"parts":[{"text":"ok"}],"role":"model"},"finishReason":"STOP"}]}"#,
            )
            .unwrap();
        assert!(chunk.complete);
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn unknown_provider() {
        assert!(matches!(
            bridge().parse_line("cohere", "[DONE]"),
            Err(LlmError::ProviderNotFound { .. })
        ));
    }
}
