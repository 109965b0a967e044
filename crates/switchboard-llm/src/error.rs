use thiserror::Error;

/// Errors that can occur during gateway operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Bad tool definition, missing handler, failed argument validation,
    /// unsupported capability, or otherwise malformed request
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Named provider does not exist in configuration
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: String },

    /// Provider cannot represent the requested content or operation
    #[error("provider {provider} does not support {operation}")]
    UnsupportedConversion { provider: String, operation: String },

    /// Upstream provider returned an error or could not be reached
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Error during streaming response
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Vendor payload could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// A tool call failed while running a batch in fail-fast mode
    #[error("tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Coarse grouping used to decide how an error propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller mistake, surfaced before any network call
    Configuration,
    /// Provider lookup or conversion failure
    Provider,
    /// Tool execution failure or cancellation
    Execution,
    /// Transport, streaming, or payload decoding failure
    Transport,
    /// Bug or unexpected state
    Internal,
}

impl LlmError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::ProviderNotFound { .. } | Self::UnsupportedConversion { .. } => ErrorCategory::Provider,
            Self::ToolExecution { .. } | Self::Cancelled => ErrorCategory::Execution,
            Self::Upstream(_) | Self::Streaming(_) | Self::Parse(_) => ErrorCategory::Transport,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
