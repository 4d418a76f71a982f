//! Anthropic Messages API backend.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;
use std::time::Duration;

use crate::error::PreconditionError;
use crate::synthesis::backend::{
    BackendError, CompletionRequest, CompletionResponse, GenerativeBackend, StopReason,
};

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const KEY_PREFIX: &str = "sk-ant-";

/// Check a credential's shape without contacting the service.
pub fn validate_api_key(var: &str, key: &str) -> Result<(), PreconditionError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(PreconditionError::MissingCredential {
            var: var.to_string(),
        });
    }
    if !key.starts_with(KEY_PREFIX) {
        return Err(PreconditionError::MalformedCredential {
            var: var.to_string(),
            reason: format!("expected a key starting with '{}'", KEY_PREFIX),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,

    /// Transport-level timeout; the coordinator applies its own per-call deadline
    pub request_timeout: Duration,
}

pub struct AnthropicBackend {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self, PreconditionError> {
        validate_api_key(API_KEY_VAR, &config.api_key)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PreconditionError::ClientSetup(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Read the credential from the environment (`.env` must already be loaded).
    pub fn from_env(request_timeout: Duration) -> Result<Self, PreconditionError> {
        let api_key = std::env::var(API_KEY_VAR).map_err(|_| PreconditionError::MissingCredential {
            var: API_KEY_VAR.to_string(),
        })?;
        let base_url = std::env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Self::new(AnthropicConfig {
            api_key: api_key.trim().to_string(),
            base_url,
            request_timeout,
        })
    }

    /// Minimal round trip confirming the key is accepted.
    pub async fn ping(&self, model: &str) -> Result<(), BackendError> {
        self.complete(CompletionRequest {
            model: model.to_string(),
            system: String::new(),
            prompt: "Reply with the single word: pong".to_string(),
            max_output_tokens: 8,
        })
        .await
        .map(|_| ())
    }

    fn build_headers(&self) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key)
                .map_err(|e| BackendError::InvalidRequest(e.to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_payload(request: &CompletionRequest) -> Value {
        let mut payload = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_output_tokens,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
        });
        if !request.system.is_empty() {
            payload["system"] = Value::String(request.system.clone());
        }
        payload
    }

    fn parse_response(body: &Value) -> Result<CompletionResponse, BackendError> {
        let blocks = body
            .get("content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| BackendError::Serialization("missing content array".to_string()))?;

        let text = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        let stop_reason = body
            .get("stop_reason")
            .and_then(|v| v.as_str())
            .map(StopReason::from_api)
            .unwrap_or(StopReason::EndTurn);

        Ok(CompletionResponse { text, stop_reason })
    }

    fn map_error(status: u16, retry_after: Option<u64>, body: &str) -> BackendError {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| body.to_string());

        match status {
            401 | 403 => BackendError::Authentication(message),
            429 => BackendError::RateLimited { retry_after },
            400 if message.to_lowercase().contains("policy") => BackendError::ContentPolicy(message),
            400..=499 if status != 408 => BackendError::InvalidRequest(message),
            _ => BackendError::Server { status, message },
        }
    }
}

#[async_trait]
impl GenerativeBackend for AnthropicBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let headers = self.build_headers()?;
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let payload = Self::build_payload(&request);

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::map_error(status.as_u16(), retry_after, &text));
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| BackendError::Serialization(e.to_string()))?;
        Self::parse_response(&body)
    }
}
