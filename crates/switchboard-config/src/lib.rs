//! Configuration types for the Switchboard gateway
//!
//! The core library consumes these as plain values; only the CLI reads them
//! from disk via [`GatewayConfig::load`].

#![allow(clippy::must_use_candidate)]

pub mod duration;
mod env;
mod loader;
pub mod provider;
pub mod telemetry;
pub mod tools;

use indexmap::IndexMap;
use serde::Deserialize;

pub use env::{expand_env, expand_value};
pub use provider::{ProviderConfig, ProviderKind};
pub use telemetry::{LogFormat, TelemetryConfig};
pub use tools::ToolSettings;

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Provider used when a request does not name one
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Provider configurations keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Tool execution defaults
    #[serde(default)]
    pub tools: ToolSettings,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl GatewayConfig {
    /// Add a provider under `name`
    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, config: ProviderConfig) -> Self {
        self.providers.insert(name.into(), config);
        self
    }

    #[must_use]
    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    /// Name of the provider used when a request names none
    ///
    /// The explicit `default_provider` wins; otherwise the first configured
    /// provider is used.
    pub fn default_provider_name(&self) -> Option<&str> {
        self.default_provider
            .as_deref()
            .or_else(|| self.providers.keys().next().map(String::as_str))
    }
}
