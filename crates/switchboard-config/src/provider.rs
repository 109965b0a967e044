use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::duration;

/// Vendor wire protocols the gateway can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat completions API and compatible servers
    Openai,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
    /// Mistral chat completions API
    Mistral,
    /// Self-hosted vLLM OpenAI-compatible server
    Vllm,
}

impl ProviderKind {
    /// Every supported protocol, in declaration order
    pub const ALL: [Self; 5] = [Self::Openai, Self::Anthropic, Self::Google, Self::Mistral, Self::Vllm];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Mistral => "mistral",
            Self::Vllm => "vllm",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown provider type: {s}"))
    }
}

/// Configuration for a single upstream provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire protocol
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// API key, may itself contain `{{ env.VAR }}` placeholders
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Per-request timeout enforced by the HTTP transport (e.g. "60s")
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub timeout: Option<Duration>,
    /// Retries performed by the HTTP transport on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Model used when a request does not name one
    #[serde(default)]
    pub default_model: Option<String>,
    /// Default sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Default completion token limit
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

const fn default_max_retries() -> u32 {
    2
}

impl ProviderConfig {
    /// Create a configuration with only the protocol set
    pub const fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: None,
            timeout: None,
            max_retries: default_max_retries(),
            default_model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Resolve the API key, expanding `{{ env.VAR }}` placeholders on demand
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced environment variable is unset and
    /// has no default
    pub fn resolve_api_key(&self) -> anyhow::Result<Option<SecretString>> {
        let Some(key) = &self.api_key else {
            return Ok(None);
        };

        let expanded = crate::env::expand_value(key.expose_secret())
            .map_err(|e| anyhow::anyhow!("failed to resolve api key: {e}"))?;

        if expanded.is_empty() {
            return Ok(None);
        }

        Ok(Some(SecretString::from(expanded)))
    }
}
