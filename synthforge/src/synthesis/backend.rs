//! The generative backend seam: one request in, one completion out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request sent to a completion service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_output_tokens: u32,
}

/// Why the backend stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    Refusal,
    Other(String),
}

impl StopReason {
    pub fn from_api(reason: &str) -> Self {
        match reason {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "refusal" => StopReason::Refusal,
            other => StopReason::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub stop_reason: StopReason,
}

impl CompletionResponse {
    pub fn new(text: impl Into<String>, stop_reason: StopReason) -> Self {
        Self {
            text: text.into(),
            stop_reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Timeout")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Content policy: {0}")]
    ContentPolicy(String),

    #[error("Malformed response: {0}")]
    Serialization(String),
}

impl BackendError {
    /// The request itself was refused; resending it unchanged may not help.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BackendError::InvalidRequest(_) | BackendError::ContentPolicy(_)
        )
    }
}

/// An unreliable, rate-limited completion service
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError>;
}
