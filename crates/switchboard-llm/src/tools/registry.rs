//! Process-wide catalog of tools and per-vendor converters

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use serde_json::Value;
use switchboard_config::ProviderKind;

use super::converter::{
    AnthropicConverter, GoogleConverter, MistralConverter, OpenAiConverter, ToolConverter, VllmConverter,
};
use super::normalize_tool_name;
use super::schema::validate_parameters;
use crate::error::LlmError;
use crate::types::{ToolCall, ToolDefinition, ToolResult};

/// Registered tools keyed by normalized name, in registration order
///
/// Safe to share across tasks; reads and writes take short internal locks
/// and never hold them across an await.
pub struct ToolRegistry {
    tools: RwLock<IndexMap<String, ToolDefinition>>,
    converters: RwLock<HashMap<ProviderKind, Arc<dyn ToolConverter>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create an empty registry with a converter for every provider kind
    pub fn new() -> Self {
        let converters: HashMap<ProviderKind, Arc<dyn ToolConverter>> = HashMap::from([
            (ProviderKind::Openai, Arc::new(OpenAiConverter) as Arc<dyn ToolConverter>),
            (ProviderKind::Anthropic, Arc::new(AnthropicConverter)),
            (ProviderKind::Google, Arc::new(GoogleConverter)),
            (ProviderKind::Mistral, Arc::new(MistralConverter)),
            (ProviderKind::Vllm, Arc::new(VllmConverter)),
        ]);

        Self {
            tools: RwLock::new(IndexMap::new()),
            converters: RwLock::new(converters),
        }
    }

    /// Validate and store a tool, returning its normalized name
    ///
    /// Registering a name that already exists replaces the earlier definition.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name or description is empty or
    /// the parameter schema is not an object schema
    pub fn register_tool(&self, tool: ToolDefinition) -> Result<String, LlmError> {
        let tool = Self::prepare(tool)?;
        let name = tool.name.clone();
        self.store(tool);
        Ok(name)
    }

    /// Register several tools; nothing is stored unless every one is valid
    ///
    /// # Errors
    ///
    /// Returns the first validation failure
    pub fn register_tools(&self, tools: impl IntoIterator<Item = ToolDefinition>) -> Result<Vec<String>, LlmError> {
        let prepared = tools.into_iter().map(Self::prepare).collect::<Result<Vec<_>, _>>()?;

        Ok(prepared
            .into_iter()
            .map(|tool| {
                let name = tool.name.clone();
                self.store(tool);
                name
            })
            .collect())
    }

    fn prepare(mut tool: ToolDefinition) -> Result<ToolDefinition, LlmError> {
        if tool.name.trim().is_empty() {
            return Err(LlmError::configuration("tool name must not be empty"));
        }
        if tool.description.trim().is_empty() {
            return Err(LlmError::configuration(format!(
                "tool {}: description must not be empty",
                tool.name
            )));
        }

        validate_parameters(&tool.name, &tool.parameters)?;

        let normalized = normalize_tool_name(&tool.name);
        if normalized != tool.name {
            tracing::debug!(original = %tool.name, normalized = %normalized, "normalized tool name");
        }
        tool.name = normalized;

        Ok(tool)
    }

    fn store(&self, tool: ToolDefinition) {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);

        if tools.contains_key(&tool.name) {
            tracing::warn!(tool = %tool.name, "tool re-registered, replacing previous definition");
        } else {
            tracing::debug!(tool = %tool.name, has_handler = tool.handler.is_some(), "tool registered");
        }

        tools.insert(tool.name.clone(), tool);
    }

    /// Remove a tool by name; unknown names are a no-op
    pub fn unregister_tool(&self, name: &str) -> Option<ToolDefinition> {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&normalize_tool_name(name))
    }

    /// Look a tool up by raw or normalized name
    pub fn get_tool(&self, name: &str) -> Option<ToolDefinition> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_tool_name(name))
            .cloned()
    }

    /// Every tool in registration order
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a selection to definitions
    ///
    /// `None` selects every registered tool.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first unknown tool
    pub fn select(&self, names: Option<&[String]>) -> Result<Vec<ToolDefinition>, LlmError> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);

        let Some(names) = names else {
            return Ok(tools.values().cloned().collect());
        };

        names
            .iter()
            .map(|name| {
                tools
                    .get(&normalize_tool_name(name))
                    .cloned()
                    .ok_or_else(|| LlmError::configuration(format!("Tool not found: {name}")))
            })
            .collect()
    }

    /// Tool definitions in the vendor's shape, ready for a request body
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown tool names, or
    /// `UnsupportedConversion` when no converter is registered for `kind`
    pub fn tools_for_provider(&self, kind: ProviderKind, names: Option<&[String]>) -> Result<Vec<Value>, LlmError> {
        let selected = self.select(names)?;
        if selected.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.converter(kind)?.format_tools(&selected))
    }

    /// Extract tool calls from a vendor payload fragment
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed payloads, or
    /// `UnsupportedConversion` when no converter is registered for `kind`
    pub fn parse_tool_calls(&self, kind: ProviderKind, payload: &Value) -> Result<Vec<ToolCall>, LlmError> {
        self.converter(kind)?.parse_tool_calls(payload)
    }

    /// Tool results as messages in the vendor's shape
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedConversion` when no converter is registered for `kind`
    pub fn format_tool_responses(&self, kind: ProviderKind, results: &[ToolResult]) -> Result<Vec<Value>, LlmError> {
        Ok(self.converter(kind)?.format_tool_responses(results))
    }

    /// Install or replace the converter used for `kind`
    pub fn register_converter(&self, kind: ProviderKind, converter: Arc<dyn ToolConverter>) {
        self.converters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, converter);
    }

    pub fn remove_converter(&self, kind: ProviderKind) -> Option<Arc<dyn ToolConverter>> {
        self.converters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
    }

    fn converter(&self, kind: ProviderKind) -> Result<Arc<dyn ToolConverter>, LlmError> {
        self.converters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .ok_or_else(|| LlmError::UnsupportedConversion {
                provider: kind.as_str().to_owned(),
                operation: "tool conversion".to_owned(),
            })
    }
}
