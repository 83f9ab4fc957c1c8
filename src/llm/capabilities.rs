//! Summarizer and Analyzer capabilities.
//!
//! The worker only sees these two traits. Each has an LLM-backed
//! implementation and an extractive one that needs no network and is used
//! when no API key is configured.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{CompletionRequest, LlmProvider};
use crate::error::LlmError;

/// Provider name recorded by the extractive implementations.
pub const FALLBACK_PROVIDER: &str = "fallback";

/// Longest digest the extractive implementations produce.
pub const DIGEST_MAX_CHARS: usize = 900;

const SUMMARY_SYSTEM: &str = "You summarize physician community discussions about investing. \
Be concise. Highlight risks. Do not provide individualized financial advice.";

const SUMMARY_INSTRUCTIONS: &str = "Summarize this in 5 bullets. Then list 3 key risks. \
Then list 3 recommended next steps for diligence:";

const ANALYSIS_SYSTEM: &str = "You are an investment diligence assistant for physicians. \
Be practical, identify risks, ask underwriting questions, and avoid personalized financial advice.";

const ANALYSIS_MEMORY_SYSTEM: &str = "You are an investment diligence assistant for physicians. \
Be practical, identify risks, ask underwriting questions, and avoid personalized financial advice. \
Use deal memory to spot repeat failure modes.";

const ANALYSIS_INSTRUCTIONS: &str = "Analyze the following deal summary. Output: (1) Thesis \
(2) Underwriting questions (3) Key risks (4) Diligence checklist (5) Red flags";

/// Result of summarizing a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub provider: String,
    pub model: Option<String>,
}

/// Result of analyzing a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub analysis: String,
    pub provider: String,
    pub model: Option<String>,
    /// Whether prior outcomes were fed into the analysis.
    pub used_memory: bool,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<Summary, LlmError>;
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// `memory_context` may be empty, meaning no prior outcomes are available.
    async fn analyze(&self, text: &str, memory_context: &str) -> Result<Analysis, LlmError>;
}

/// The pair of capabilities a worker dispatches to.
#[derive(Clone)]
pub struct Capabilities {
    pub summarizer: Arc<dyn Summarizer>,
    pub analyzer: Arc<dyn Analyzer>,
}

impl Capabilities {
    pub fn new(summarizer: Arc<dyn Summarizer>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            summarizer,
            analyzer,
        }
    }

    /// Both capabilities backed by one provider.
    pub fn from_provider(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(
            Arc::new(LlmSummarizer::new(Arc::clone(&provider))),
            Arc::new(LlmAnalyzer::new(provider)),
        )
    }

    /// Offline, extractive capabilities.
    pub fn extractive() -> Self {
        Self::new(Arc::new(ExtractiveSummarizer), Arc::new(ExtractiveAnalyzer))
    }
}

// ── LLM-backed ──────────────────────────────────────────────────────

pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str) -> Result<Summary, LlmError> {
        let prompt = format!("{SUMMARY_INSTRUCTIONS}\n\n{}", text.trim());
        let response = self
            .provider
            .complete(CompletionRequest::new(SUMMARY_SYSTEM, prompt))
            .await?;

        Ok(Summary {
            summary: response.content,
            provider: self.provider.name().to_string(),
            model: Some(self.provider.model_name().to_string()),
        })
    }
}

pub struct LlmAnalyzer {
    provider: Arc<dyn LlmProvider>,
}

impl LlmAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, text: &str, memory_context: &str) -> Result<Analysis, LlmError> {
        let memory = memory_context.trim();
        let used_memory = !memory.is_empty();

        let request = if used_memory {
            CompletionRequest::new(
                ANALYSIS_MEMORY_SYSTEM,
                format!(
                    "{ANALYSIS_INSTRUCTIONS} (6) Compare against similar past deals.\n\n\
                     DEAL SUMMARY:\n{}\n\nDEAL MEMORY (prior outcomes):\n{memory}",
                    text.trim()
                ),
            )
        } else {
            CompletionRequest::new(
                ANALYSIS_SYSTEM,
                format!("{ANALYSIS_INSTRUCTIONS}.\n\n{}", text.trim()),
            )
        };

        let response = self.provider.complete(request.with_max_tokens(2048)).await?;

        Ok(Analysis {
            analysis: response.content,
            provider: self.provider.name().to_string(),
            model: Some(self.provider.model_name().to_string()),
            used_memory,
        })
    }
}

// ── Extractive ──────────────────────────────────────────────────────

/// Head and tail of `text`, at most `max_chars` characters plus the marker.
///
/// Text that already fits is returned trimmed and unchanged.
pub fn extractive_digest(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let head_len = max_chars * 7 / 10;
    let tail_len = max_chars * 2 / 10;
    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();
    format!("{head}\n[...]\n{tail}")
}

pub struct ExtractiveSummarizer;

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, text: &str) -> Result<Summary, LlmError> {
        Ok(Summary {
            summary: extractive_digest(text, DIGEST_MAX_CHARS),
            provider: FALLBACK_PROVIDER.to_string(),
            model: None,
        })
    }
}

pub struct ExtractiveAnalyzer;

#[async_trait]
impl Analyzer for ExtractiveAnalyzer {
    async fn analyze(&self, text: &str, memory_context: &str) -> Result<Analysis, LlmError> {
        let digest = extractive_digest(text, DIGEST_MAX_CHARS);
        let memory = memory_context.trim();
        let (analysis, used_memory) = if memory.is_empty() {
            (digest, false)
        } else {
            (format!("{digest}\n\n{memory}"), true)
        };

        Ok(Analysis {
            analysis,
            provider: FALLBACK_PROVIDER.to_string(),
            model: None,
            used_memory,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::llm::provider::CompletionResponse;

    /// Records the last request and echoes a fixed reply.
    struct RecordingProvider {
        last: Mutex<Option<CompletionRequest>>,
    }

    impl RecordingProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                last: Mutex::new(None),
            })
        }

        fn last_prompt(&self) -> String {
            self.last.lock().unwrap().as_ref().unwrap().prompt.clone()
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            *self.last.lock().unwrap() = Some(request);
            Ok(CompletionResponse {
                content: "reply".into(),
            })
        }
    }

    #[test]
    fn short_text_is_not_digested() {
        assert_eq!(extractive_digest("  hello  ", 900), "hello");
    }

    #[test]
    fn long_text_keeps_head_and_tail() {
        let text = format!("{}{}{}", "h".repeat(700), "m".repeat(500), "t".repeat(300));
        let digest = extractive_digest(&text, 900);
        let (head, tail) = digest.split_once("\n[...]\n").unwrap();
        assert_eq!(head, "h".repeat(630));
        assert_eq!(tail, "t".repeat(180));
    }

    #[tokio::test]
    async fn llm_summarizer_reports_provider_and_model() {
        let provider = RecordingProvider::new();
        let summarizer = LlmSummarizer::new(provider.clone());
        let out = summarizer.summarize(" thread body ").await.unwrap();
        assert_eq!(out.summary, "reply");
        assert_eq!(out.provider, "stub");
        assert_eq!(out.model.as_deref(), Some("stub-model"));
        assert!(provider.last_prompt().ends_with("thread body"));
    }

    #[tokio::test]
    async fn llm_analyzer_includes_memory_only_when_present() {
        let provider = RecordingProvider::new();
        let analyzer = LlmAnalyzer::new(provider.clone());

        let out = analyzer.analyze("deal", "").await.unwrap();
        assert!(!out.used_memory);
        assert!(!provider.last_prompt().contains("DEAL MEMORY"));

        let out = analyzer.analyze("deal", "1. Old - outcome: passed").await.unwrap();
        assert!(out.used_memory);
        assert!(provider.last_prompt().contains("DEAL MEMORY (prior outcomes):\n1. Old"));
    }

    #[tokio::test]
    async fn extractive_analyzer_appends_memory() {
        let out = ExtractiveAnalyzer.analyze("deal text", "memory").await.unwrap();
        assert_eq!(out.analysis, "deal text\n\nmemory");
        assert_eq!(out.provider, FALLBACK_PROVIDER);
        assert!(out.used_memory);
    }
}
