//! vLLM provider
//!
//! Speaks the `OpenAI` chat format. Guided decoding rejects several JSON
//! Schema keywords, so schemas are cut down before they are sent, and the
//! server is assumed to be text-only.

use serde_json::Value;
use switchboard_config::{ProviderConfig, ProviderKind};

use super::{Endpoint, HttpRequest, OpenAiProvider, Provider, ProviderCapabilities};
use crate::error::LlmError;
use crate::tools::schema::{VLLM_UNSUPPORTED_KEYWORDS, strip_keywords};
use crate::types::{ChatResponse, Message, RequestOptions, ResponseFormat, StreamChunk};

/// Default local vLLM server
const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";

pub struct VllmProvider {
    inner: OpenAiProvider,
}

impl VllmProvider {
    /// Create from provider configuration; an API key is optional
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL or API key cannot be resolved
    pub fn new(name: &str, config: &ProviderConfig) -> Result<Self, LlmError> {
        let endpoint = Endpoint::from_config(name, config, DEFAULT_BASE_URL)?;
        Ok(Self {
            inner: OpenAiProvider::with_endpoint(name, endpoint),
        })
    }
}

impl Provider for VllmProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Vllm
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tools: true,
            images: false,
            structured_output: true,
        }
    }

    fn format_messages(&self, messages: &[Message]) -> Result<Vec<Value>, LlmError> {
        super::reject_images(self.name(), messages)?;
        self.inner.format_messages(messages)
    }

    fn build_request(&self, model: &str, messages: Vec<Value>, options: &RequestOptions) -> Result<Value, LlmError> {
        let mut options = options.clone();
        if let Some(ResponseFormat::JsonSchema { schema, .. }) = options.response_format.as_mut() {
            *schema = strip_keywords(schema, VLLM_UNSUPPORTED_KEYWORDS);
        }

        let request = OpenAiProvider::wire_request(model, messages, &options, false);
        super::to_value(&request)
    }

    fn http_request(&self, model: &str, body: Value, stream: bool) -> Result<HttpRequest, LlmError> {
        tracing::trace!(provider = %self.name(), model, stream, "preparing vllm chat request");
        self.inner.chat_request(body, stream)
    }

    fn parse_response(&self, body: Value) -> Result<ChatResponse, LlmError> {
        self.inner.parse_response(body)
    }

    fn parse_stream_chunk(&self, data: &str) -> StreamChunk {
        self.inner.parse_stream_chunk(data)
    }
}
