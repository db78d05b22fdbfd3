use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Backend returned no text")]
    Empty,
}

/// Text generation collaborator.
///
/// One fallible blocking call per instructor turn; implementations must not
/// retry internally.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}
