//! Vendor wire formats
//!
//! Plain serde shapes, touched only by `convert` and the providers. Nothing
//! outside this crate sees them.

pub mod anthropic;
pub mod google;
pub mod mistral;
pub mod openai;
