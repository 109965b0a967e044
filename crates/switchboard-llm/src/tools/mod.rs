//! Tool definitions, per-vendor tool conversion, and execution

pub mod converter;
pub mod executor;
pub mod handler;
pub mod registry;
pub mod schema;

pub use converter::{AnthropicConverter, GoogleConverter, MistralConverter, OpenAiConverter, ToolConverter, VllmConverter};
pub use executor::{ExecutionOptions, ToolExecutor};
pub use handler::{ToolContext, ToolHandler};
pub use registry::ToolRegistry;

/// Longest tool name every supported vendor accepts
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// Rewrite a tool name into the token every vendor accepts
///
/// Characters outside `[A-Za-z0-9_.-]` become `_`, a leading character
/// that is not a letter or underscore gets a `_` prefix, and the result is
/// cut to [`MAX_TOOL_NAME_LEN`] characters.
pub fn normalize_tool_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.chars().next().is_some_and(|c| !(c.is_ascii_alphabetic() || c == '_')) {
        out.insert(0, '_');
    }

    // Only ASCII survives the mapping, so byte length equals char count
    out.truncate(MAX_TOOL_NAME_LEN);
    out
}
