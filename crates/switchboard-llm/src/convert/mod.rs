//! Conversions between canonical types and provider wire formats
//!
//! Each submodule owns one vendor family. Conversions that cannot fail are
//! `From` impls; those that can return `LlmError`.

pub mod anthropic;
pub mod google;
pub mod mistral;
pub mod openai;
