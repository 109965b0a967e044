use std::path::Path;

use crate::{GatewayConfig, ProviderKind};

impl GatewayConfig {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, variable expansion or
    /// TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if variable expansion, parsing, or validation fails
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        tracing::debug!(providers = config.providers.len(), "configuration loaded");

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        if let Some(default) = &self.default_provider
            && !self.providers.contains_key(default)
        {
            anyhow::bail!("default_provider '{default}' is not a configured provider");
        }

        for (name, provider) in &self.providers {
            if provider.kind == ProviderKind::Vllm && provider.base_url.is_none() {
                anyhow::bail!("provider '{name}' is a vllm server and requires base_url");
            }

            if let Some(temperature) = provider.temperature
                && !(0.0..=2.0).contains(&temperature)
            {
                anyhow::bail!("provider '{name}' temperature must be between 0.0 and 2.0");
            }
        }

        if self.tools.max_concurrent == 0 {
            anyhow::bail!("tools.max_concurrent must be greater than 0");
        }

        Ok(())
    }
}
