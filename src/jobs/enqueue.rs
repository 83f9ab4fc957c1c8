//! Enqueue service: validate, rate-limit, de-duplicate, insert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::fingerprint::request_fingerprint;
use super::model::{Job, JobId, JobKind, JobStatusView, NewJob, TargetRefs};
use super::rate_limit::RateLimiter;
use crate::error::{DatabaseError, EnqueueError};
use crate::store::JobStore;

/// A submission as received from the caller. `job_type` is still untrusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub job_type: String,
    pub submitter_id: i64,
    pub input_text: Option<String>,
    pub targets: TargetRefs,
    pub idempotency_key: Option<String>,
}

/// Result of a successful enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub job: Job,
    /// True when an existing active job was returned instead of a new row.
    pub reused: bool,
}

impl Enqueued {
    fn created(job: Job) -> Self {
        Self { job, reused: false }
    }

    fn reused(job: Job) -> Self {
        Self { job, reused: true }
    }
}

pub struct EnqueueService {
    store: Arc<dyn JobStore>,
    limiter: RateLimiter,
}

impl EnqueueService {
    pub fn new(store: Arc<dyn JobStore>, limiter: RateLimiter) -> Self {
        Self { store, limiter }
    }

    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Enqueued, EnqueueError> {
        self.enqueue_at(request, Utc::now()).await
    }

    /// Enqueue as if the call happened at `now`.
    ///
    /// Order matters: type check, then rate limit, then idempotency key, then
    /// fingerprint. A retry that would be reused is still refused once the
    /// submitter is over the limit.
    pub async fn enqueue_at(
        &self,
        request: EnqueueRequest,
        now: DateTime<Utc>,
    ) -> Result<Enqueued, EnqueueError> {
        let kind: JobKind = request
            .job_type
            .trim()
            .parse()
            .map_err(EnqueueError::InvalidJobType)?;
        let submitter_id = request.submitter_id;

        self.limiter
            .check(self.store.as_ref(), submitter_id, now)
            .await?;

        let input_text = non_empty(request.input_text);
        let idempotency_key = non_empty(request.idempotency_key);
        let fingerprint =
            request_fingerprint(kind, submitter_id, &request.targets, input_text.as_deref());

        if let Some(ref key) = idempotency_key {
            if let Some(job) = self
                .store
                .find_active_by_idempotency_key(submitter_id, kind, key)
                .await?
            {
                debug!(job_id = job.id, submitter_id, job_type = %kind, "Reusing job by idempotency key");
                return Ok(Enqueued::reused(job));
            }
        }

        if let Some(job) = self
            .store
            .find_active_by_fingerprint(submitter_id, kind, &fingerprint)
            .await?
        {
            debug!(job_id = job.id, submitter_id, job_type = %kind, "Reusing job by fingerprint");
            return Ok(Enqueued::reused(job));
        }

        let new_job = NewJob {
            kind,
            submitter_id,
            targets: request.targets,
            input_text,
            idempotency_key,
            fingerprint,
            created_at: now,
        };

        match self.store.insert_job(&new_job).await {
            Ok(job) => {
                info!(job_id = job.id, submitter_id, job_type = %kind, "Job enqueued");
                Ok(Enqueued::created(job))
            }
            // A concurrent enqueue with the same key won the insert.
            Err(DatabaseError::Constraint(reason)) => {
                let key = new_job.idempotency_key.as_deref().unwrap_or_default();
                match self
                    .store
                    .find_active_by_idempotency_key(submitter_id, kind, key)
                    .await?
                {
                    Some(job) => {
                        debug!(job_id = job.id, submitter_id, job_type = %kind, "Lost insert race, reusing job");
                        Ok(Enqueued::reused(job))
                    }
                    None => Err(DatabaseError::Constraint(reason).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Caller-facing status of a job, or `None` if the id is unknown.
    pub async fn get_status(&self, job_id: JobId) -> Result<Option<JobStatusView>, DatabaseError> {
        let Some(job) = self.store.get_job(job_id).await? else {
            return Ok(None);
        };
        let result_ref = self.store.analysis_for_job(job_id).await?.map(|r| r.id);
        Ok(Some(JobStatusView::new(job, result_ref)))
    }
}

/// Trim; treat blank as absent.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::jobs::{AnalysisRecord, JobOutcome};
    use crate::store::LibSqlBackend;
    use crate::worker::state::JobStatus;

    async fn service(max: u32) -> (EnqueueService, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let limiter = RateLimiter::new(std::time::Duration::from_secs(3600), max);
        (EnqueueService::new(db.clone(), limiter), db)
    }

    fn analyze(submitter_id: i64, deal_ref: i64, key: Option<&str>) -> EnqueueRequest {
        EnqueueRequest {
            job_type: "analyze_deal".into(),
            submitter_id,
            targets: TargetRefs::deal(deal_ref),
            idempotency_key: key.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unknown_job_type_is_rejected_without_insert() {
        let (svc, db) = service(12).await;
        let err = svc
            .enqueue(EnqueueRequest {
                job_type: "translate".into(),
                submitter_id: 1,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EnqueueError::InvalidJobType(ref t) if t == "translate"));
        assert_eq!(
            db.count_created_since(1, Utc::now() - chrono::Duration::days(1))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn same_idempotency_key_returns_same_job() {
        let (svc, _db) = service(12).await;
        let first = svc.enqueue(analyze(7, 42, Some("abc"))).await.unwrap();
        // Different text changes the fingerprint; the key still matches.
        let mut retry = analyze(7, 42, Some(" abc "));
        retry.input_text = Some("changed".into());
        let second = svc.enqueue(retry).await.unwrap();

        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.job.id, second.job.id);
    }

    #[tokio::test]
    async fn matching_fingerprint_reuses_active_job() {
        let (svc, _db) = service(12).await;
        let first = svc.enqueue(analyze(7, 42, None)).await.unwrap();
        let second = svc.enqueue(analyze(7, 42, None)).await.unwrap();
        assert!(second.reused);
        assert_eq!(first.job.id, second.job.id);

        let other_deal = svc.enqueue(analyze(7, 43, None)).await.unwrap();
        assert!(!other_deal.reused);
    }

    #[tokio::test]
    async fn terminal_jobs_are_not_reused() {
        let (svc, db) = service(12).await;
        let first = svc.enqueue(analyze(7, 42, Some("abc"))).await.unwrap();
        db.claim_next("w").await.unwrap();
        db.fail_job(first.job.id, "boom").await.unwrap();

        let again = svc.enqueue(analyze(7, 42, Some("abc"))).await.unwrap();
        assert!(!again.reused);
        assert_ne!(again.job.id, first.job.id);
        assert_eq!(again.job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn blank_text_and_key_are_dropped() {
        let (svc, _db) = service(12).await;
        let mut req = analyze(7, 42, Some("   "));
        req.input_text = Some("  \n ".into());
        let out = svc.enqueue(req).await.unwrap();
        assert!(out.job.input_text.is_none());
        assert!(out.job.idempotency_key.is_none());
    }

    #[tokio::test]
    async fn rate_limit_applies_before_dedup() {
        let (svc, _db) = service(1).await;
        svc.enqueue(analyze(7, 42, Some("abc"))).await.unwrap();
        let err = svc.enqueue(analyze(7, 42, Some("abc"))).await.unwrap_err();
        assert!(matches!(err, EnqueueError::RateLimited { .. }));
    }

    /// Store whose active-job lookups miss until an insert has failed,
    /// like a second caller that read just before the first one inserted.
    struct LateReader {
        inner: Arc<LibSqlBackend>,
        blind: AtomicBool,
    }

    #[async_trait]
    impl JobStore for LateReader {
        async fn init_schema(&self) -> Result<(), DatabaseError> {
            self.inner.init_schema().await
        }

        async fn insert_job(&self, job: &NewJob) -> Result<Job, DatabaseError> {
            let result = self.inner.insert_job(job).await;
            if result.is_err() {
                self.blind.store(false, Ordering::SeqCst);
            }
            result
        }

        async fn find_active_by_idempotency_key(
            &self,
            submitter_id: i64,
            kind: JobKind,
            idempotency_key: &str,
        ) -> Result<Option<Job>, DatabaseError> {
            if self.blind.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner
                .find_active_by_idempotency_key(submitter_id, kind, idempotency_key)
                .await
        }

        async fn find_active_by_fingerprint(
            &self,
            submitter_id: i64,
            kind: JobKind,
            fingerprint: &str,
        ) -> Result<Option<Job>, DatabaseError> {
            if self.blind.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner
                .find_active_by_fingerprint(submitter_id, kind, fingerprint)
                .await
        }

        async fn count_created_since(
            &self,
            submitter_id: i64,
            since: DateTime<Utc>,
        ) -> Result<u64, DatabaseError> {
            self.inner.count_created_since(submitter_id, since).await
        }

        async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, DatabaseError> {
            self.inner.claim_next(worker_id).await
        }

        async fn complete_job(&self, id: JobId, outcome: &JobOutcome) -> Result<Job, DatabaseError> {
            self.inner.complete_job(id, outcome).await
        }

        async fn fail_job(&self, id: JobId, error: &str) -> Result<Job, DatabaseError> {
            self.inner.fail_job(id, error).await
        }

        async fn get_job(&self, id: JobId) -> Result<Option<Job>, DatabaseError> {
            self.inner.get_job(id).await
        }

        async fn analysis_for_job(
            &self,
            job_id: JobId,
        ) -> Result<Option<AnalysisRecord>, DatabaseError> {
            self.inner.analysis_for_job(job_id).await
        }

        async fn list_analyses(&self, deal_ref: i64) -> Result<Vec<AnalysisRecord>, DatabaseError> {
            self.inner.list_analyses(deal_ref).await
        }

        async fn stale_running(
            &self,
            started_before: DateTime<Utc>,
        ) -> Result<Vec<Job>, DatabaseError> {
            self.inner.stale_running(started_before).await
        }
    }

    #[tokio::test]
    async fn lost_insert_race_returns_winner_as_reused() {
        let (svc, db) = service(12).await;
        let winner = svc.enqueue(analyze(7, 42, Some("abc"))).await.unwrap();

        let late = Arc::new(LateReader {
            inner: db.clone(),
            blind: AtomicBool::new(true),
        });
        let loser = EnqueueService::new(late.clone(), RateLimiter::default());
        let out = loser.enqueue(analyze(7, 42, Some("abc"))).await.unwrap();

        assert!(out.reused);
        assert_eq!(out.job.id, winner.job.id);
        // The miss was real: the insert was attempted and refused.
        assert!(!late.blind.load(Ordering::SeqCst));
        assert_eq!(
            db.count_created_since(7, Utc::now() - chrono::Duration::days(1))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn status_reports_unknown_as_none() {
        let (svc, _db) = service(12).await;
        assert!(svc.get_status(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_of_queued_job() {
        let (svc, _db) = service(12).await;
        let out = svc.enqueue(analyze(7, 42, None)).await.unwrap();
        let view = svc.get_status(out.job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.job_type, JobKind::AnalyzeDeal);
        assert_eq!(view.deal_ref, Some(42));
        assert!(view.result_ref.is_none());
        assert!(view.finished_at.is_none());
    }
}
