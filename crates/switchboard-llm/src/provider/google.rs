//! Google Gemini provider implementation

use serde_json::Value;
use switchboard_config::{ProviderConfig, ProviderKind};

use super::{Auth, Endpoint, HttpRequest, Provider, ProviderCapabilities};
use crate::convert::google::{contents, stream_chunk, tool_config};
use crate::error::LlmError;
use crate::protocol::google::{
    GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part, SystemInstruction,
};
use crate::tools::schema::{GOOGLE_UNSUPPORTED_KEYWORDS, strip_keywords};
use crate::types::{ChatResponse, Message, RequestOptions, ResponseFormat, Role, StreamChunk};

/// Default Google Generative Language API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const JSON_MIME_TYPE: &str = "application/json";

pub struct GoogleProvider {
    name: String,
    endpoint: Endpoint,
}

impl GoogleProvider {
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

    fn generation_config(options: &RequestOptions) -> Option<GenerationConfig> {
        let (response_mime_type, response_schema) = match &options.response_format {
            Some(ResponseFormat::JsonObject) => (Some(JSON_MIME_TYPE), None),
            Some(ResponseFormat::JsonSchema { schema, .. }) => (
                Some(JSON_MIME_TYPE),
                Some(strip_keywords(schema, GOOGLE_UNSUPPORTED_KEYWORDS)),
            ),
            Some(ResponseFormat::Text) | None => (None, None),
        };

        let config = GenerationConfig {
            temperature: options.temperature,
            top_p: options.top_p,
            max_output_tokens: options.max_tokens,
            stop_sequences: options.stop.clone().unwrap_or_default(),
            response_mime_type,
            response_schema,
        };

        (!config.is_empty()).then_some(config)
    }
}

impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
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
        let mut out: Vec<Value> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| super::system_entry(m.content.as_text()))
            .collect();

        for content in contents(messages)? {
            out.push(super::to_value(&content)?);
        }

        Ok(out)
    }

    fn build_request(&self, model: &str, messages: Vec<Value>, options: &RequestOptions) -> Result<Value, LlmError> {
        let (system, contents) = super::take_system(messages);
        let offer_tools = !options.tools.is_empty();

        let request = GenerateContentRequest {
            contents,
            system_instruction: system.map(|text| SystemInstruction {
                parts: vec![Part::Text(text)],
            }),
            generation_config: Self::generation_config(options),
            tools: options.tools.clone(),
            tool_config: options
                .tool_choice
                .as_ref()
                .filter(|_| offer_tools)
                .map(tool_config),
        };

        tracing::trace!(provider = %self.name, model, "built generateContent request");
        super::to_value(&request)
    }

    fn http_request(&self, model: &str, body: Value, stream: bool) -> Result<HttpRequest, LlmError> {
        let path = if stream {
            format!("models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("models/{model}:generateContent")
        };

        Ok(HttpRequest {
            url: self.endpoint.url(&path)?,
            headers: self.endpoint.headers(Auth::Header("x-goog-api-key"))?,
            body,
            stream,
        })
    }

    fn parse_response(&self, body: Value) -> Result<ChatResponse, LlmError> {
        super::decode_response::<GenerateContentResponse>(&self.name, body).map(Into::into)
    }

    fn parse_stream_chunk(&self, data: &str) -> StreamChunk {
        super::decode_chunk::<GenerateContentResponse>(&self.name, data, stream_chunk)
    }
}
