//! Provider abstraction shared by every LLM backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use crate::error::LlmError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A single-turn completion: one system message, one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 1024,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
}

/// An LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name recorded on results (e.g. "anthropic").
    fn name(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Map a non-success HTTP status to an [`LlmError`], consuming the body.
pub(crate) async fn error_for_status(provider: &str, response: Response) -> LlmError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed {
            provider: provider.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            LlmError::RateLimited {
                provider: provider.to_string(),
                retry_after,
            }
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            LlmError::RequestFailed {
                provider: provider.to_string(),
                reason: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            }
        }
    }
}

/// Map a transport error.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> LlmError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason,
    }
}
