//! Resolves a claimed job's input and dispatches it to its capability.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::JobError;
use crate::jobs::{Job, JobKind, JobOutcome, NewAnalysisRecord};
use crate::llm::Capabilities;
use crate::store::{Deal, OutcomeMemory, Post, PriorOutcome, TargetStore};

/// Lessons longer than this are cut in the memory block.
const LESSONS_MAX_CHARS: usize = 400;

pub struct Executor {
    targets: Arc<dyn TargetStore>,
    memory: Arc<dyn OutcomeMemory>,
    capabilities: Capabilities,
    memory_limit: usize,
}

impl Executor {
    pub fn new(
        targets: Arc<dyn TargetStore>,
        memory: Arc<dyn OutcomeMemory>,
        capabilities: Capabilities,
        memory_limit: usize,
    ) -> Self {
        Self {
            targets,
            memory,
            capabilities,
            memory_limit,
        }
    }

    /// Run the job to an outcome. Any error fails the job.
    pub async fn execute(&self, job: &Job) -> Result<JobOutcome, JobError> {
        let text = self.resolve_input(job).await?;
        if text.is_empty() {
            return Err(JobError::MissingInput);
        }

        match job.kind {
            JobKind::SummarizeThread => {
                let summary = self.capabilities.summarizer.summarize(&text).await?;
                Ok(JobOutcome {
                    output_structured: encode(&summary)?,
                    output_text: summary.summary,
                    analysis: None,
                })
            }
            JobKind::AnalyzeDeal => {
                let memory = self.memory_context(job.targets.deal_ref).await;
                let analysis = self.capabilities.analyzer.analyze(&text, &memory).await?;
                let output_structured = encode(&analysis)?;

                let record = match job.targets.deal_ref {
                    Some(deal_ref) if !analysis.analysis.trim().is_empty() => {
                        Some(NewAnalysisRecord {
                            deal_ref,
                            created_by: job.submitter_id,
                            provider: analysis.provider.clone(),
                            model: analysis.model.clone(),
                            output_text: analysis.analysis.clone(),
                            output_structured: output_structured.clone(),
                        })
                    }
                    _ => None,
                };

                Ok(JobOutcome {
                    output_text: analysis.analysis,
                    output_structured,
                    analysis: record,
                })
            }
        }
    }

    /// Input text for the job, read from the *current* target rows.
    ///
    /// Inline text wins, then the deal, then the post. Returns an empty
    /// string when nothing resolves.
    pub async fn resolve_input(&self, job: &Job) -> Result<String, JobError> {
        let inline = job.input_text.as_deref().map(str::trim).unwrap_or_default();
        if !inline.is_empty() {
            return Ok(inline.to_string());
        }

        if let Some(deal_ref) = job.targets.deal_ref {
            let Some(deal) = self.targets.deal(deal_ref).await? else {
                return Ok(String::new());
            };
            let post = match deal.post_ref {
                Some(post_ref) => self.targets.post(post_ref).await?,
                None => None,
            };
            return Ok(compose_deal_text(&deal, post.as_ref()));
        }

        if let Some(post_ref) = job.targets.post_ref {
            let content = self
                .targets
                .post(post_ref)
                .await?
                .and_then(|p| p.content)
                .unwrap_or_default();
            return Ok(content.trim().to_string());
        }

        Ok(String::new())
    }

    /// Rendered prior outcomes; empty on any lookup failure.
    async fn memory_context(&self, deal_ref: Option<i64>) -> String {
        let Some(deal_ref) = deal_ref else {
            return String::new();
        };
        match self.memory.similar_outcomes(deal_ref, self.memory_limit).await {
            Ok(outcomes) => {
                debug!(deal_ref, count = outcomes.len(), "Loaded prior outcomes");
                render_memory(&outcomes)
            }
            Err(e) => {
                warn!(deal_ref, error = %e, "Outcome lookup failed, analyzing without memory");
                String::new()
            }
        }
    }
}

fn encode<T: serde::Serialize>(result: &T) -> Result<String, JobError> {
    serde_json::to_string(result)
        .map_err(|e| JobError::Execution(format!("failed to encode result: {e}")))
}

/// Labelled blocks describing a deal, separated by blank lines.
pub fn compose_deal_text(deal: &Deal, post: Option<&Post>) -> String {
    fn or_blank<T: ToString>(v: &Option<T>) -> String {
        v.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    let mut parts = vec![
        format!("ASSET_CLASS: {}", deal.asset_class),
        format!("STRATEGY: {}", or_blank(&deal.strategy)),
        format!("LOCATION: {}", or_blank(&deal.location)),
        format!("HORIZON_MONTHS: {}", or_blank(&deal.time_horizon_months)),
        format!("TARGET_IRR: {}", or_blank(&deal.target_irr)),
        format!("TARGET_MULTIPLE: {}", or_blank(&deal.target_multiple)),
        format!("MINIMUM_INVESTMENT: {}", or_blank(&deal.minimum_investment)),
        format!("SPONSOR: {}", or_blank(&deal.sponsor_name)),
        format!("THESIS:\n{}", deal.thesis),
    ];

    if let Some(content) = post.and_then(|p| p.content.as_deref()).filter(|c| !c.is_empty()) {
        parts.push(format!("POST_CONTENT:\n{content}"));
    }
    if let Some(risks) = deal.key_risks.as_deref().filter(|r| !r.is_empty()) {
        parts.push(format!("KEY_RISKS:\n{risks}"));
    }
    if let Some(diligence) = deal.diligence_needed.as_deref().filter(|d| !d.is_empty()) {
        parts.push(format!("DILIGENCE_NEEDED:\n{diligence}"));
    }

    parts.join("\n\n").trim().to_string()
}

/// Compact text block of prior outcomes, or empty when there are none.
pub fn render_memory(outcomes: &[PriorOutcome]) -> String {
    if outcomes.is_empty() {
        return String::new();
    }

    let mut lines = vec!["Similar closed/passed deals and lessons:".to_string()];
    for (i, o) in outcomes.iter().enumerate() {
        let title = o.title.as_deref().unwrap_or("(untitled)");
        let outcome = o.outcome.as_deref().unwrap_or("unknown");
        let lessons = o.key_lessons.as_deref().unwrap_or_default().trim();
        let lessons = match lessons.char_indices().nth(LESSONS_MAX_CHARS) {
            Some((idx, _)) => format!("{}...", &lessons[..idx]),
            None => lessons.to_string(),
        };
        lines.push(format!("{}. {title} - outcome: {outcome}. Lessons: {lessons}", i + 1));
    }
    lines.join("\n")
}
