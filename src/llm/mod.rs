//! LLM integration for the job queue.
//!
//! Supports:
//! - **Anthropic**: Messages API over reqwest
//! - **OpenAI**: chat completions over reqwest
//!
//! With no API key configured the extractive capabilities are used instead,
//! so a worker can always drain the queue.

pub mod anthropic;
pub mod capabilities;
pub mod openai;
pub mod provider;

pub use capabilities::{
    Analysis, Analyzer, Capabilities, ExtractiveAnalyzer, ExtractiveSummarizer, LlmAnalyzer,
    LlmSummarizer, Summarizer, Summary,
};
pub use provider::{CompletionRequest, CompletionResponse, LlmProvider};

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Environment variable holding this backend's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => anthropic::DEFAULT_MODEL,
            Self::OpenAi => openai::DEFAULT_MODEL,
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown LLM backend '{other}', expected anthropic or openai")),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Read `AI_JOBS_LLM_BACKEND`, the backend's API key and `AI_JOBS_MODEL`.
    ///
    /// Returns `Ok(None)` when the API key is unset or blank.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let backend = match std::env::var("AI_JOBS_LLM_BACKEND") {
            Ok(raw) => raw.parse::<LlmBackend>().map_err(|message| ConfigError::InvalidValue {
                key: "AI_JOBS_LLM_BACKEND".to_string(),
                message,
            })?,
            Err(_) => LlmBackend::Anthropic,
        };

        let api_key = match std::env::var(backend.api_key_var()) {
            Ok(key) if !key.trim().is_empty() => SecretString::from(key.trim().to_string()),
            _ => return Ok(None),
        };

        let model = std::env::var("AI_JOBS_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());

        Ok(Some(Self {
            backend,
            api_key,
            model,
        }))
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Anthropic => Arc::new(anthropic::AnthropicProvider::new(
            config.api_key.clone(),
            &config.model,
        )),
        LlmBackend::OpenAi => Arc::new(openai::OpenAiProvider::new(
            config.api_key.clone(),
            &config.model,
        )),
    };
    tracing::info!("Using {} (model: {})", provider.name(), config.model);
    Ok(provider)
}

/// Capabilities for the given configuration, extractive when there is none.
pub fn create_capabilities(config: Option<&LlmConfig>) -> Result<Capabilities, LlmError> {
    match config {
        Some(config) => Ok(Capabilities::from_provider(create_provider(config)?)),
        None => {
            tracing::warn!("No LLM API key configured, using extractive fallback");
            Ok(Capabilities::extractive())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_anthropic_provider() {
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: SecretString::from("test-key"),
            model: "claude-3-5-sonnet-latest".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_create_openai_provider() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[test]
    fn backend_parsing() {
        assert_eq!("OpenAI".parse::<LlmBackend>(), Ok(LlmBackend::OpenAi));
        assert_eq!(" anthropic ".parse::<LlmBackend>(), Ok(LlmBackend::Anthropic));
        assert!("ollama".parse::<LlmBackend>().is_err());
    }

    #[tokio::test]
    async fn no_config_means_extractive() {
        let caps = create_capabilities(None).unwrap();
        let summary = caps.summarizer.summarize("text").await.unwrap();
        assert_eq!(summary.provider, "fallback");
    }
}
