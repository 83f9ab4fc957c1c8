//! Job and analysis record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::worker::state::JobStatus;

/// Row id of a job.
pub type JobId = i64;

/// The closed set of job kinds. Every kind has exactly one handler in the
/// executor's `match`, so adding a variant fails to compile until it is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SummarizeThread,
    AnalyzeDeal,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::SummarizeThread, JobKind::AnalyzeDeal];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SummarizeThread => "summarize_thread",
            Self::AnalyzeDeal => "analyze_deal",
        }
    }

    /// Notification text sent when a job of this kind completes.
    pub const fn completion_message(&self) -> &'static str {
        match self {
            Self::SummarizeThread => "AI summary complete",
            Self::AnalyzeDeal => "AI analysis complete",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Optional references to the entity a job operates on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRefs {
    pub post_ref: Option<i64>,
    pub deal_ref: Option<i64>,
}

impl TargetRefs {
    pub fn post(post_ref: i64) -> Self {
        Self {
            post_ref: Some(post_ref),
            deal_ref: None,
        }
    }

    pub fn deal(deal_ref: i64) -> Self {
        Self {
            post_ref: None,
            deal_ref: Some(deal_ref),
        }
    }
}

/// A persisted job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub submitter_id: i64,
    pub targets: TargetRefs,
    pub input_text: Option<String>,
    pub idempotency_key: Option<String>,
    pub fingerprint: String,
    pub output_text: Option<String>,
    /// JSON-encoded capability result.
    pub output_structured: Option<String>,
    pub error: Option<String>,
    /// Worker that claimed the job, for diagnosing stuck `Running` rows.
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Everything needed to insert a new `Queued` job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub kind: JobKind,
    pub submitter_id: i64,
    pub targets: TargetRefs,
    pub input_text: Option<String>,
    pub idempotency_key: Option<String>,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// Successful result of executing a job, written back by the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub output_text: String,
    pub output_structured: String,
    /// Present only for deal analyses with a deal reference and non-empty output.
    pub analysis: Option<NewAnalysisRecord>,
}

/// Append-only analysis snapshot tied to a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub deal_ref: i64,
    /// Originating job. Informational only, not a foreign key.
    pub job_id: Option<JobId>,
    pub created_by: i64,
    pub provider: String,
    pub model: Option<String>,
    pub output_text: String,
    pub output_structured: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysisRecord {
    pub deal_ref: i64,
    pub created_by: i64,
    pub provider: String,
    pub model: Option<String>,
    pub output_text: String,
    pub output_structured: String,
}

/// Caller-facing status of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub job_type: JobKind,
    pub post_ref: Option<i64>,
    pub deal_ref: Option<i64>,
    pub error: Option<String>,
    /// Id of the analysis record produced by this job, if any.
    pub result_ref: Option<i64>,
    pub output_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatusView {
    pub fn new(job: Job, result_ref: Option<i64>) -> Self {
        Self {
            id: job.id,
            status: job.status,
            job_type: job.kind,
            post_ref: job.targets.post_ref,
            deal_ref: job.targets.deal_ref,
            error: job.error,
            result_ref,
            output_text: job.output_text,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}
