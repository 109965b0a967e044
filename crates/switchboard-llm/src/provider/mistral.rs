//! Mistral provider implementation

use serde_json::Value;
use switchboard_config::{ProviderConfig, ProviderKind};

use super::{Auth, Endpoint, HttpRequest, Provider, ProviderCapabilities};
use crate::convert::mistral::{message, stream_chunk, tool_choice_value};
use crate::convert::openai::response_format_value;
use crate::error::LlmError;
use crate::protocol::mistral::{MistralRequest, MistralResponse, MistralStreamChunk};
use crate::types::{ChatResponse, Message, RequestOptions, StreamChunk};

/// Default Mistral API base URL
const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

pub struct MistralProvider {
    name: String,
    endpoint: Endpoint,
}

impl MistralProvider {
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

impl Provider for MistralProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Mistral
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
        messages.iter().map(|m| super::to_value(&message(m))).collect()
    }

    fn build_request(&self, model: &str, messages: Vec<Value>, options: &RequestOptions) -> Result<Value, LlmError> {
        let offer_tools = !options.tools.is_empty();

        let request = MistralRequest {
            model: model.to_owned(),
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stop: options.stop.clone().unwrap_or_default(),
            stream: options.stream,
            tools: if offer_tools { options.tools.clone() } else { Vec::new() },
            tool_choice: options
                .tool_choice
                .as_ref()
                .filter(|_| offer_tools)
                .map(tool_choice_value),
            response_format: options.response_format.as_ref().map(response_format_value),
        };

        super::to_value(&request)
    }

    fn http_request(&self, model: &str, body: Value, stream: bool) -> Result<HttpRequest, LlmError> {
        tracing::trace!(provider = %self.name, model, stream, "preparing mistral chat request");
        Ok(HttpRequest {
            url: self.endpoint.url("chat/completions")?,
            headers: self.endpoint.headers(Auth::Bearer)?,
            body,
            stream,
        })
    }

    fn parse_response(&self, body: Value) -> Result<ChatResponse, LlmError> {
        super::decode_response::<MistralResponse>(&self.name, body).map(Into::into)
    }

    fn parse_stream_chunk(&self, data: &str) -> StreamChunk {
        super::decode_chunk::<MistralStreamChunk>(&self.name, data, stream_chunk)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{ToolCall, ToolChoice, parse_arguments};

    fn provider() -> MistralProvider {
        MistralProvider::new("mistral", &ProviderConfig::new(ProviderKind::Mistral).with_api_key("m-key")).unwrap()
    }

    #[test]
    fn tool_round_trip_ids_match() {
        let provider = provider();
        let messages = provider
            .format_messages(&[
                Message::user("2+2?"),
                Message::assistant_with_tool_calls(
                    "",
                    vec![ToolCall::new("call_abcdefghijk", "math", parse_arguments(r#"{"expression":"2+2"}"#))],
                ),
                Message::tool("call_abcdefghijk", "math", "4"),
            ])
            .unwrap();

        assert_eq!(messages[1]["tool_calls"][0]["id"], "cdefghijk");
        assert_eq!(messages[2]["tool_call_id"], "cdefghijk");
    }

    #[test]
    fn required_choice_maps_to_any() {
        let options = RequestOptions {
            tools: vec![json!({"type": "function", "function": {"name": "math"}})],
            tool_choice: Some(ToolChoice::Required),
            ..RequestOptions::default()
        };
        let body = provider().build_request("mistral-large-latest", Vec::new(), &options).unwrap();
        assert_eq!(body["tool_choice"], "any");
    }

    #[test]
    fn stream_with_chunked_content() {
        let chunk = provider()
            .parse_stream_chunk(r#"{"choices":[{"delta":{"content":[{"type":"text","text":"Bonjour"}]}}]}"#);
        assert_eq!(chunk.content.as_deref(), Some("Bonjour"));
        assert!(provider().parse_stream_chunk("[DONE]").complete);
    }

    #[test]
    fn endpoint() {
        let request = provider().http_request("m", json!({}), false).unwrap();
        assert_eq!(request.url.as_str(), "https://api.mistral.ai/v1/chat/completions");
    }
}
