//! Programmatic configuration builder for integration tests

use std::time::Duration;

use switchboard_config::{GatewayConfig, ProviderConfig, ProviderKind};
use url::Url;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: GatewayConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    /// Add a provider of `kind` pointed at a mock backend
    pub fn with_provider(mut self, name: &str, kind: ProviderKind, base_url: &str) -> Self {
        let mut provider = ProviderConfig::new(kind)
            .with_api_key("test-key")
            .with_base_url(Url::parse(base_url).expect("valid URL"))
            .with_default_model("mock-model");
        provider.max_retries = 0;
        provider.timeout = Some(Duration::from_secs(5));

        self.config.providers.insert(name.to_owned(), provider);
        self
    }

    /// Allow `retries` retries on the named provider
    pub fn with_retries(mut self, name: &str, retries: u32) -> Self {
        if let Some(provider) = self.config.providers.get_mut(name) {
            provider.max_retries = retries;
        }
        self
    }

    pub fn with_max_round_trips(mut self, max: usize) -> Self {
        self.config.tools.max_round_trips = max;
        self
    }

    pub fn build(self) -> GatewayConfig {
        self.config
    }
}
