//! OpenAI-compatible provider implementation

use serde_json::Value;
use switchboard_config::{ProviderConfig, ProviderKind};

use super::{Auth, Endpoint, HttpRequest, Provider, ProviderCapabilities};
use crate::convert::openai::{response_format_value, stream_chunk, tool_choice_value};
use crate::error::LlmError;
use crate::protocol::openai::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, StreamOptions};
use crate::types::{ChatResponse, Message, RequestOptions, StreamChunk};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Whether the provider is the canonical `OpenAI` API (vs a compatible third-party)
fn is_canonical_openai(endpoint: &Endpoint) -> bool {
    endpoint.base_url().host_str().is_some_and(|h| h == "api.openai.com")
}

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    name: String,
    endpoint: Endpoint,
}

impl OpenAiProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL or API key cannot be resolved
    pub fn new(name: &str, config: &ProviderConfig) -> Result<Self, LlmError> {
        Ok(Self::with_endpoint(name, Endpoint::from_config(name, config, DEFAULT_BASE_URL)?))
    }

    pub(crate) fn with_endpoint(name: &str, endpoint: Endpoint) -> Self {
        Self {
            name: name.to_owned(),
            endpoint,
        }
    }

    /// Request body shared with other OpenAI-shaped vendors
    pub(crate) fn wire_request(
        model: &str,
        messages: Vec<Value>,
        options: &RequestOptions,
        include_usage: bool,
    ) -> ChatCompletionRequest {
        let offer_tools = !options.tools.is_empty();

        ChatCompletionRequest {
            model: model.to_owned(),
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stop: options.stop.clone().unwrap_or_default(),
            stream: options.stream,
            tools: options.tools.clone(),
            tool_choice: options
                .tool_choice
                .as_ref()
                .filter(|_| offer_tools)
                .map(tool_choice_value),
            response_format: options.response_format.as_ref().map(response_format_value),
            // Many compatible servers reject stream_options outright
            stream_options: (options.stream && include_usage).then_some(StreamOptions { include_usage: true }),
        }
    }

    pub(crate) fn chat_request(&self, body: Value, stream: bool) -> Result<HttpRequest, LlmError> {
        Ok(HttpRequest {
            url: self.endpoint.url("chat/completions")?,
            headers: self.endpoint.headers(Auth::Bearer)?,
            body,
            stream,
        })
    }
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tools: true,
            images: true,
            structured_output: true,
        }
    }

    fn format_messages(&self, messages: &[Message]) -> Result<Vec<Value>, LlmError> {
        messages.iter().map(|m| super::to_value(&ChatMessage::from(m))).collect()
    }

    fn build_request(&self, model: &str, messages: Vec<Value>, options: &RequestOptions) -> Result<Value, LlmError> {
        let request = Self::wire_request(model, messages, options, is_canonical_openai(&self.endpoint));
        super::to_value(&request)
    }

    fn http_request(&self, model: &str, body: Value, stream: bool) -> Result<HttpRequest, LlmError> {
        tracing::trace!(provider = %self.name, model, stream, "preparing chat completion request");
        self.chat_request(body, stream)
    }

    fn parse_response(&self, body: Value) -> Result<ChatResponse, LlmError> {
        super::decode_response::<ChatCompletion>(&self.name, body).map(Into::into)
    }

    fn parse_stream_chunk(&self, data: &str) -> StreamChunk {
        super::decode_chunk::<ChatCompletionChunk>(&self.name, data, stream_chunk)
    }
}
