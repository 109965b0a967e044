//! Anthropic Messages API provider implementation

use http::header::{HeaderName, HeaderValue};
use serde_json::Value;
use switchboard_config::{ProviderConfig, ProviderKind};

use super::{Auth, Endpoint, HttpRequest, Provider, ProviderCapabilities};
use crate::convert::anthropic::{message, stream_chunk, tool_choice};
use crate::error::LlmError;
use crate::protocol::anthropic::{API_VERSION, MessagesRequest, MessagesResponse, StreamEvent, Turn};
use crate::types::{ChatResponse, Message, RequestOptions, Role, StreamChunk, ToolChoice};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic requires `max_tokens` on every request
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    name: String,
    endpoint: Endpoint,
}

impl AnthropicProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL or API key cannot be resolved
    pub fn new(name: &str, config: &ProviderConfig) -> Result<Self, LlmError> {
        Ok(Self {
            name: name.to_owned(),
            endpoint: Endpoint::from_config(name, config, DEFAULT_BASE_URL)?,
        })
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tools: true,
            images: true,
            structured_output: false,
        }
    }

    /// Consecutive tool messages share one user turn of `tool_result` blocks
    fn format_messages(&self, messages: &[Message]) -> Result<Vec<Value>, LlmError> {
        let mut out: Vec<Value> = Vec::with_capacity(messages.len());
        let mut results: Option<Turn> = None;

        for msg in messages {
            if msg.role == Role::Tool {
                let blocks = message(msg).content;
                match results.as_mut() {
                    Some(turn) => turn.content.extend(blocks),
                    None => {
                        results = Some(Turn {
                            role: "user",
                            content: blocks,
                        });
                    }
                }
                continue;
            }

            if let Some(turn) = results.take() {
                out.push(super::to_value(&turn)?);
            }

            if msg.role == Role::System {
                out.push(super::system_entry(msg.content.as_text()));
            } else {
                out.push(super::to_value(&message(msg))?);
            }
        }

        if let Some(turn) = results {
            out.push(super::to_value(&turn)?);
        }

        Ok(out)
    }

    fn build_request(&self, model: &str, messages: Vec<Value>, options: &RequestOptions) -> Result<Value, LlmError> {
        if options.response_format.as_ref().is_some_and(|f| f.is_structured()) {
            return Err(LlmError::UnsupportedConversion {
                provider: self.name.clone(),
                operation: "structured output".to_owned(),
            });
        }

        let (system, messages) = super::take_system(messages);

        // Anthropic has no "none" tool choice; leaving tools out is equivalent
        let offer_tools = !options.tools.is_empty() && options.tool_choice != Some(ToolChoice::None);

        let request = MessagesRequest {
            model: model.to_owned(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            stop_sequences: options.stop.clone().unwrap_or_default(),
            stream: options.stream,
            tools: if offer_tools { options.tools.clone() } else { Vec::new() },
            tool_choice: options
                .tool_choice
                .as_ref()
                .filter(|_| offer_tools)
                .and_then(tool_choice),
        };

        super::to_value(&request)
    }

    fn http_request(&self, model: &str, body: Value, stream: bool) -> Result<HttpRequest, LlmError> {
        tracing::trace!(provider = %self.name, model, stream, "preparing anthropic messages request");

        let mut headers = self.endpoint.headers(Auth::Header("x-api-key"))?;
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(API_VERSION),
        );

        Ok(HttpRequest {
            url: self.endpoint.url("messages")?,
            headers,
            body,
            stream,
        })
    }

    fn parse_response(&self, body: Value) -> Result<ChatResponse, LlmError> {
        super::decode_response::<MessagesResponse>(&self.name, body).map(Into::into)
    }

    fn parse_stream_chunk(&self, data: &str) -> StreamChunk {
        super::decode_chunk::<StreamEvent>(&self.name, data, stream_chunk)
    }
}
