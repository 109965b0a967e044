//! Provider trait and implementations for LLM backends
//!
//! A provider is a pure translator: it turns canonical messages and options
//! into a vendor request, and vendor payloads back into canonical responses
//! and stream chunks. Network I/O belongs to the [`Transport`](crate::transport::Transport).

pub mod anthropic;
pub mod google;
pub mod mistral;
pub mod openai;
pub mod vllm;

use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use switchboard_config::{ProviderConfig, ProviderKind};
use url::Url;

use crate::error::LlmError;
use crate::types::{ChatResponse, Message, RequestOptions, StreamChunk};

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use mistral::MistralProvider;
pub use openai::OpenAiProvider;
pub use vllm::VllmProvider;

/// SSE payload that ends an OpenAI-style stream
pub const DONE_MARKER: &str = "[DONE]";

/// Features a provider can represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ProviderCapabilities {
    /// Whether the provider supports streaming responses
    pub streaming: bool,
    /// Whether the provider supports tool/function calling
    pub tools: bool,
    /// Whether messages may carry image parts
    pub images: bool,
    /// Whether JSON object or JSON schema output can be requested
    pub structured_output: bool,
}

/// A fully prepared upstream call
#[derive(Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Value,
    /// Expect an SSE response
    pub stream: bool,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Credential headers are marked sensitive and print redacted
        f.debug_struct("HttpRequest")
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

/// Trait implemented by each LLM provider backend
pub trait Provider: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    /// Wire protocol spoken by this provider
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> ProviderCapabilities;

    fn supports_tools(&self) -> bool {
        self.capabilities().tools
    }

    fn supports_images(&self) -> bool {
        self.capabilities().images
    }

    fn supports_structured_output(&self) -> bool {
        self.capabilities().structured_output
    }

    /// Convert canonical messages into the vendor's message list
    ///
    /// Vendors that keep the system prompt outside the message list get a
    /// `{"role": "system"}` entry here, which [`build_request`](Self::build_request) hoists.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedConversion` for content the vendor cannot
    /// represent, or a configuration error for malformed conversations
    fn format_messages(&self, messages: &[Message]) -> Result<Vec<Value>, LlmError>;

    /// Assemble the vendor request body
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedConversion` for options the vendor cannot honor
    fn build_request(&self, model: &str, messages: Vec<Value>, options: &RequestOptions) -> Result<Value, LlmError>;

    /// Endpoint, headers, and body for one call
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL or credentials are invalid
    fn http_request(&self, model: &str, body: Value, stream: bool) -> Result<HttpRequest, LlmError>;

    /// Convert a non-streaming response body
    ///
    /// # Errors
    ///
    /// Returns `Upstream` for vendor error bodies and `Parse` for bodies that
    /// do not match the vendor's schema
    fn parse_response(&self, body: Value) -> Result<ChatResponse, LlmError>;

    /// Convert one SSE `data` payload
    ///
    /// Never fails: decode problems come back in the chunk's `error` field.
    fn parse_stream_chunk(&self, data: &str) -> StreamChunk;
}

/// Build a provider from configuration
///
/// # Errors
///
/// Returns a configuration error for invalid base URLs, missing required
/// settings, or unresolvable API keys
pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Arc<dyn Provider>, LlmError> {
    let provider: Arc<dyn Provider> = match config.kind {
        ProviderKind::Openai => Arc::new(OpenAiProvider::new(name, config)?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(name, config)?),
        ProviderKind::Google => Arc::new(GoogleProvider::new(name, config)?),
        ProviderKind::Mistral => Arc::new(MistralProvider::new(name, config)?),
        ProviderKind::Vllm => Arc::new(VllmProvider::new(name, config)?),
    };

    tracing::debug!(provider = name, kind = %config.kind, "provider initialized");
    Ok(provider)
}

/// Base URL and credentials shared by every provider
#[derive(Clone)]
pub(crate) struct Endpoint {
    base_url: Url,
    api_key: Option<SecretString>,
}

impl Endpoint {
    pub(crate) fn from_config(name: &str, config: &ProviderConfig, default_base_url: &str) -> Result<Self, LlmError> {
        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(default_base_url)
                .map_err(|e| LlmError::configuration(format!("provider {name}: invalid base URL: {e}")))?,
        };

        let api_key = config
            .resolve_api_key()
            .map_err(|e| LlmError::configuration(format!("provider {name}: {e:#}")))?;

        Ok(Self { base_url, api_key })
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append `path` to the base URL, keeping any base path prefix
    pub(crate) fn url(&self, path: &str) -> Result<Url, LlmError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(|e| LlmError::configuration(format!("invalid endpoint URL: {e}")))
    }

    /// Headers common to every call, with the key under `auth` when configured
    pub(crate) fn headers(&self, auth: Auth) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            let (name, value) = match auth {
                Auth::Bearer => (http::header::AUTHORIZATION, format!("Bearer {}", key.expose_secret())),
                Auth::Header(name) => (HeaderName::from_static(name), key.expose_secret().to_owned()),
            };

            let mut value = HeaderValue::try_from(value)
                .map_err(|_| LlmError::configuration("api key contains characters not allowed in a header"))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        Ok(headers)
    }
}

/// How a provider presents its API key
#[derive(Debug, Clone, Copy)]
pub(crate) enum Auth {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Key as the value of the named header (lowercase)
    Header(&'static str),
}

/// Vendor error message carried in a response or stream payload
pub(crate) fn error_message(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::String(message) => Some(message.clone()),
        Value::Object(detail) => Some(
            detail
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| Value::Object(detail.clone()).to_string(), str::to_owned),
        ),
        _ => None,
    }
}

/// Decode a non-streaming body, surfacing vendor error bodies as `Upstream`
pub(crate) fn decode_response<T: DeserializeOwned>(provider: &str, body: Value) -> Result<T, LlmError> {
    if let Some(message) = error_message(&body) {
        return Err(LlmError::Upstream(format!("{provider}: {message}")));
    }

    serde_json::from_value(body).map_err(|e| LlmError::Parse(format!("{provider}: unexpected response shape: {e}")))
}

/// Decode one SSE payload and convert it, never failing
pub(crate) fn decode_chunk<T: DeserializeOwned>(
    provider: &str,
    data: &str,
    convert: impl FnOnce(T) -> StreamChunk,
) -> StreamChunk {
    let data = data.trim();
    if data.is_empty() {
        return StreamChunk::default();
    }
    if data == DONE_MARKER {
        return StreamChunk::done();
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(provider, error = %e, data, "unparseable stream payload");
            return StreamChunk::error(format!("{provider}: malformed stream payload: {e}"));
        }
    };

    if let Some(message) = error_message(&value) {
        return StreamChunk::error(message);
    }

    match serde_json::from_value::<T>(value) {
        Ok(payload) => convert(payload),
        Err(e) => StreamChunk::error(format!("{provider}: unexpected stream payload: {e}")),
    }
}

/// Pseudo-entry carrying system text until `build_request` hoists it
pub(crate) fn system_entry(text: String) -> Value {
    json!({ "role": "system", "content": text })
}

/// Split hoisted system entries from the rest, joining their text
pub(crate) fn take_system(messages: Vec<Value>) -> (Option<String>, Vec<Value>) {
    let (system, rest): (Vec<Value>, Vec<Value>) = messages
        .into_iter()
        .partition(|m| m.get("role").and_then(Value::as_str) == Some("system"));

    let texts: Vec<&str> = system
        .iter()
        .filter_map(|m| m.get("content").and_then(Value::as_str))
        .filter(|t| !t.is_empty())
        .collect();

    let system = (!texts.is_empty()).then(|| texts.join("\n\n"));
    (system, rest)
}

/// Reject image parts for providers that cannot take them
pub(crate) fn reject_images(provider: &str, messages: &[Message]) -> Result<(), LlmError> {
    if messages.iter().any(Message::has_images) {
        return Err(LlmError::UnsupportedConversion {
            provider: provider.to_owned(),
            operation: "image content".to_owned(),
        });
    }
    Ok(())
}

pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, LlmError> {
    serde_json::to_value(value).map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to encode request: {e}")))
}
