//! Provider-agnostic LLM client for Switchboard
//!
//! One canonical request and response model over `OpenAI`, Anthropic, Google,
//! Mistral, and vLLM, with tool registration, concurrent tool execution,
//! stream normalization, and a bridge for the legacy line-based stream API.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod client;
pub mod convert;
pub mod error;
pub mod legacy;
pub mod protocol;
pub mod provider;
pub mod stream;
pub mod tools;
pub mod transport;
pub mod types;

pub use client::{EventStream, LlmClient, ProviderInfo, ToolLoopOptions, ToolLoopResponse};
pub use error::{ErrorCategory, LlmError};
pub use legacy::{LegacyBridge, LegacyChunk, LegacyStream, LegacyToolCall};
pub use provider::{HttpRequest, Provider, ProviderCapabilities};
pub use stream::{ChunkStream, StreamCancelHandle};
pub use tools::{ExecutionOptions, ToolContext, ToolExecutor, ToolHandler, ToolRegistry};
pub use transport::{RawEventStream, ReqwestTransport, Transport};
pub use types::{
    ChatRequest, ChatResponse, Content, ContentPart, FinishReason, Message, ResponseFormat, Role, StreamChunk,
    StreamEvent, StreamState, StreamSummary, ToolCall, ToolChoice, ToolDefinition, ToolResult, Usage,
};
