use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::ToolHandler;

/// Definition of a tool the model can call
#[derive(Clone)]
pub struct ToolDefinition {
    /// Tool name, normalized to a vendor-safe token on registration
    pub name: String,
    /// Human-readable description shown to the model
    pub description: String,
    /// JSON Schema (object type) describing the arguments
    pub parameters: Value,
    /// Callable bound at registration time
    pub handler: Option<Arc<dyn ToolHandler>>,
    /// Free-form caller metadata, never sent to vendors
    pub metadata: Map<String, Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: None,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn with_handler(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("handler", &self.handler.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// How the model should select tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    Auto,
    /// Model will not call any tools
    None,
    /// Model must call at least one tool
    Required,
    /// Model must call the named tool
    Function(String),
}
