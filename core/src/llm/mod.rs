//! LLM module: the completion seam and an HTTP client behind it
//!
//! This module provides:
//! - `Completion`, the opaque `complete(prompt) -> text` collaborator
//! - `LlmClientConfig`, `ChatCompletionClient` for OpenAI-compatible backends

mod client;
mod completion;

pub use client::{ChatCompletionClient, LlmClientConfig};
pub use completion::{Completion, CompletionError};
