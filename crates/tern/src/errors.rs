use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by tool invocation. Everything except an unknown tool
/// name is worth retrying: the model can usually repair its arguments.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Tool timed out after {0} seconds")]
    Timeout(u64),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ToolError::NotFound(_))
    }
}

/// Tools return complete output text or fail; there are no partial results.
pub type ToolOutput = Result<String, ToolError>;

/// Errors raised while talking to the model endpoint.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("stream timed out after {0:?}")]
    Timeout(Duration),
}
