use std::future::Future;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Ambient information handed to every tool invocation
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Provider that requested the call
    pub provider: Option<String>,
    /// Model that requested the call
    pub model: Option<String>,
    /// Caller-supplied data passed through untouched
    pub metadata: Map<String, Value>,
}

impl ToolContext {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            model: Some(model.into()),
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Callable bound to a tool definition
///
/// Any `Fn(Map<String, Value>, ToolContext) -> impl Future<Output = anyhow::Result<Value>>`
/// closure implements this trait.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Map<String, Value>, context: ToolContext) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Map<String, Value>, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, arguments: Map<String, Value>, context: ToolContext) -> anyhow::Result<Value> {
        (self)(arguments, context).await
    }
}
