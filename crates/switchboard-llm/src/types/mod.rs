//! Canonical types for gateway requests, responses, and tool calls
//!
//! These types are provider-agnostic; every wire format converts to and
//! from them.

pub mod message;
pub mod request;
pub mod response;
pub mod result;
pub mod stream;
pub mod tool;

pub use message::{
    Content, ContentPart, Message, RAW_ARGUMENTS_KEY, Role, ToolCall, arguments_from_value, parse_arguments,
};
pub use request::{ChatRequest, RequestOptions, ResponseFormat};
pub use response::{ChatResponse, FinishReason, Usage};
pub use result::{ToolError, ToolErrorKind, ToolOutcome, ToolResult};
pub use stream::{StreamChunk, StreamEvent, StreamState, StreamSummary, ToolCallDelta};
pub use tool::{ToolChoice, ToolDefinition};
