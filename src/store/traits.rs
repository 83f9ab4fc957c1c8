//! Storage traits: the job table itself plus the read/notify seams the worker
//! consumes from the host application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::jobs::{AnalysisRecord, Job, JobId, JobKind, JobOutcome, NewJob};

/// Durable job table with an atomic claim.
///
/// Every worker process talks to its own handle; coordination happens only
/// through the rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Enqueue side ────────────────────────────────────────────────

    /// Insert a new `Queued` job and return the stored row.
    ///
    /// Returns [`DatabaseError::Constraint`] if an active job already holds the
    /// same `(submitter, kind, idempotency_key)`.
    async fn insert_job(&self, job: &NewJob) -> Result<Job, DatabaseError>;

    /// Most recent Queued/Running job for `(submitter, kind, idempotency_key)`.
    async fn find_active_by_idempotency_key(
        &self,
        submitter_id: i64,
        kind: JobKind,
        idempotency_key: &str,
    ) -> Result<Option<Job>, DatabaseError>;

    /// Most recent Queued/Running job for `(submitter, kind, fingerprint)`.
    async fn find_active_by_fingerprint(
        &self,
        submitter_id: i64,
        kind: JobKind,
        fingerprint: &str,
    ) -> Result<Option<Job>, DatabaseError>;

    /// Number of jobs (any status) the submitter created at or after `since`.
    async fn count_created_since(
        &self,
        submitter_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u64, DatabaseError>;

    // ── Worker side ─────────────────────────────────────────────────

    /// Atomically move the oldest `Queued` job to `Running` and return it.
    ///
    /// Concurrent callers never receive the same job. Returns `None` when the
    /// queue is empty.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, DatabaseError>;

    /// `Running -> Done`: persist output and, if present, append the analysis
    /// record. Fails with [`DatabaseError::Constraint`] if the job is not
    /// `Running`.
    async fn complete_job(&self, id: JobId, outcome: &JobOutcome) -> Result<Job, DatabaseError>;

    /// `Running -> Failed` with the given (already bounded) error text.
    async fn fail_job(&self, id: JobId, error: &str) -> Result<Job, DatabaseError>;

    // ── Reads ───────────────────────────────────────────────────────

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, DatabaseError>;

    /// Analysis record produced by the given job, if any.
    async fn analysis_for_job(&self, job_id: JobId) -> Result<Option<AnalysisRecord>, DatabaseError>;

    /// All analysis records of a deal, newest first.
    async fn list_analyses(&self, deal_ref: i64) -> Result<Vec<AnalysisRecord>, DatabaseError>;

    /// `Running` jobs whose `started_at` is before `started_before`. Report only.
    async fn stale_running(&self, started_before: DateTime<Utc>) -> Result<Vec<Job>, DatabaseError>;
}

/// A discussion post owned by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: Option<i64>,
    pub content: Option<String>,
}

/// Structured deal details attached to a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: i64,
    pub post_ref: Option<i64>,
    pub asset_class: String,
    pub strategy: Option<String>,
    pub location: Option<String>,
    pub time_horizon_months: Option<i64>,
    pub target_irr: Option<f64>,
    pub target_multiple: Option<f64>,
    pub minimum_investment: Option<i64>,
    pub sponsor_name: Option<String>,
    pub thesis: String,
    pub key_risks: Option<String>,
    pub diligence_needed: Option<String>,
}

/// A closed or passed deal's recorded outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorOutcome {
    pub deal_ref: i64,
    pub title: Option<String>,
    pub outcome: Option<String>,
    pub key_lessons: Option<String>,
}

/// Read access to the entities a job can reference. Reads the *current* row.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn post(&self, post_ref: i64) -> Result<Option<Post>, DatabaseError>;

    async fn deal(&self, deal_ref: i64) -> Result<Option<Deal>, DatabaseError>;
}

/// Similarity lookup of prior outcomes used as auxiliary analysis context.
#[async_trait]
pub trait OutcomeMemory: Send + Sync {
    /// Outcomes of deals similar to `deal_ref`, most relevant first.
    async fn similar_outcomes(
        &self,
        deal_ref: i64,
        limit: usize,
    ) -> Result<Vec<PriorOutcome>, DatabaseError>;
}

/// Notification delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        recipient_id: i64,
        message: &str,
        related_ref: Option<i64>,
    ) -> Result<(), DatabaseError>;
}
