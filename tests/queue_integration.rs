//! Integration tests for the job queue.
//!
//! Each test opens a fresh database file in a temp dir. Several independent
//! `LibSqlBackend`s on the same file stand in for separate worker processes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use ai_jobs::error::{EnqueueError, LlmError};
use ai_jobs::jobs::{EnqueueRequest, EnqueueService, JobId, RateLimiter, TargetRefs};
use ai_jobs::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use ai_jobs::llm::{Analysis, Analyzer, Capabilities, Summarizer, Summary};
use ai_jobs::config::WorkerConfig;
use ai_jobs::store::{JobStore, LibSqlBackend};
use ai_jobs::worker::{JobStatus, Worker};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stub LLM provider (no real API calls).
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn name(&self) -> &str {
        "stub"
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: format!("stub reply ({} chars)", request.prompt.len()),
        })
    }
}

/// Capability that always fails, for the error path.
struct Broken;

#[async_trait]
impl Summarizer for Broken {
    async fn summarize(&self, _text: &str) -> Result<Summary, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "stub".into(),
            reason: "summarizer offline".into(),
        })
    }
}

#[async_trait]
impl Analyzer for Broken {
    async fn analyze(&self, _text: &str, _memory: &str) -> Result<Analysis, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "stub".into(),
            reason: "analyzer offline".into(),
        })
    }
}

struct Harness {
    _dir: TempDir,
    path: PathBuf,
    db: Arc<LibSqlBackend>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let db = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
        Self {
            _dir: dir,
            path,
            db,
        }
    }

    /// Another "process" on the same database file.
    async fn open_backend(&self) -> Arc<LibSqlBackend> {
        Arc::new(LibSqlBackend::new_local(&self.path).await.unwrap())
    }

    fn service(&self, max_per_window: u32) -> EnqueueService {
        EnqueueService::new(
            self.db.clone(),
            RateLimiter::new(Duration::from_secs(3600), max_per_window),
        )
    }

    async fn worker(&self, capabilities: Capabilities) -> Worker {
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        Worker::from_backend(self.open_backend().await, capabilities, config)
    }

    /// Write host-owned rows the way the host application would.
    async fn seed(&self, sql: &str) {
        raw_conn(&self.path).await.execute_batch(sql).await.unwrap();
    }

    async fn notifications(&self) -> Vec<(i64, String, Option<i64>)> {
        let conn = raw_conn(&self.path).await;
        let mut rows = conn
            .query(
                "SELECT recipient_id, message, related_post_id FROM notifications ORDER BY id",
                (),
            )
            .await
            .unwrap();
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            out.push((
                row.get::<i64>(0).unwrap(),
                row.get::<String>(1).unwrap(),
                row.get::<i64>(2).ok(),
            ));
        }
        out
    }

    async fn job_count(&self, submitter_id: i64) -> u64 {
        self.db
            .count_created_since(submitter_id, Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap()
    }
}

async fn raw_conn(path: &Path) -> libsql::Connection {
    let db = libsql::Builder::new_local(path).build().await.unwrap();
    db.connect().unwrap()
}

fn summarize_post(submitter_id: i64, post_ref: i64) -> EnqueueRequest {
    EnqueueRequest {
        job_type: "summarize_thread".into(),
        submitter_id,
        targets: TargetRefs::post(post_ref),
        ..Default::default()
    }
}

fn analyze_deal(submitter_id: i64, deal_ref: i64, key: Option<&str>) -> EnqueueRequest {
    EnqueueRequest {
        job_type: "analyze_deal".into(),
        submitter_id,
        targets: TargetRefs::deal(deal_ref),
        idempotency_key: key.map(String::from),
        ..Default::default()
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_idempotency_key_returns_same_job() {
    let h = Harness::new().await;
    let svc = h.service(12);

    let first = svc.enqueue(analyze_deal(7, 42, Some("abc"))).await.unwrap();
    let second = svc.enqueue(analyze_deal(7, 42, Some("abc"))).await.unwrap();

    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(first.job.id, second.job.id);
    assert_eq!(h.job_count(7).await, 1);
}

#[tokio::test]
async fn scenario_b_claim_moves_job_to_running() {
    let h = Harness::new().await;
    let job = h.service(12).enqueue(summarize_post(3, 9)).await.unwrap().job;
    assert_eq!(job.status, JobStatus::Queued);

    let claimed = h.db.claim_next("w1").await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert!(claimed.started_at.is_some());

    let stored = h.db.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Running);
}

#[tokio::test]
async fn scenario_c_empty_input_fails_fast() {
    let h = Harness::new().await;
    h.seed("INSERT INTO posts (id, author_id, title, content) VALUES (9, 3, 'Empty', NULL);")
        .await;
    let job = h.service(12).enqueue(summarize_post(3, 9)).await.unwrap().job;

    let worker = h.worker(Capabilities::from_provider(Arc::new(StubLlm))).await;
    let finished = worker.run_once().await.unwrap().unwrap();

    assert_eq!(finished.id, job.id);
    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished.error.as_deref().unwrap().contains("missing input"));
    assert!(finished.output_text.is_none());
    assert!(finished.output_structured.is_none());
    assert!(h.notifications().await.is_empty());
}

#[tokio::test]
async fn scenario_d_capability_error_fails_job() {
    let h = Harness::new().await;
    let svc = h.service(12);
    let job = svc
        .enqueue(EnqueueRequest {
            input_text: Some("a long discussion".into()),
            ..summarize_post(3, 9)
        })
        .await
        .unwrap()
        .job;

    let broken = Arc::new(Broken);
    let worker = h.worker(Capabilities::new(broken.clone(), broken)).await;
    worker.run_once().await.unwrap().unwrap();

    let status = svc.get_status(job.id).await.unwrap().unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.error.as_deref().unwrap().contains("summarizer offline"));
    assert!(status.finished_at.is_some());
    assert!(status.result_ref.is_none());
    assert!(h.db.analysis_for_job(job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_e_thirteenth_enqueue_is_rate_limited() {
    let h = Harness::new().await;
    let svc = h.service(12);

    for deal_ref in 1..=12 {
        svc.enqueue(analyze_deal(5, deal_ref, None)).await.unwrap();
    }
    let err = svc.enqueue(analyze_deal(5, 13, None)).await.unwrap_err();

    assert!(matches!(
        err,
        EnqueueError::RateLimited {
            submitter_id: 5,
            limit: 12,
            ..
        }
    ));
    assert_eq!(h.job_count(5).await, 12);
}

// ── Properties ──────────────────────────────────────────────────────

#[tokio::test]
async fn rate_limit_recovers_when_oldest_job_leaves_window() {
    let h = Harness::new().await;
    let svc = h.service(12);
    let now = Utc::now();
    let start = now - chrono::Duration::minutes(59);

    for deal_ref in 1..=12 {
        svc.enqueue_at(analyze_deal(5, deal_ref, None), start)
            .await
            .unwrap();
    }
    assert!(svc.enqueue_at(analyze_deal(5, 13, None), now).await.is_err());

    let later = now + chrono::Duration::minutes(2);
    let ok = svc.enqueue_at(analyze_deal(5, 13, None), later).await.unwrap();
    assert!(!ok.reused);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_backends_never_double_claim() {
    let h = Harness::new().await;
    let svc = h.service(100);
    for post_ref in 0..20 {
        svc.enqueue(summarize_post(1, post_ref)).await.unwrap();
    }

    let mut backends = Vec::new();
    for _ in 0..4 {
        backends.push(h.open_backend().await);
    }

    let handles: Vec<_> = backends
        .into_iter()
        .enumerate()
        .map(|(i, db)| {
            tokio::spawn(async move {
                let mut claimed: Vec<JobId> = Vec::new();
                while let Some(job) = db.claim_next(&format!("w{i}")).await.unwrap() {
                    claimed.push(job.id);
                }
                claimed
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(tokio::time::timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap());
    }

    let distinct: HashSet<JobId> = all.iter().copied().collect();
    assert_eq!(all.len(), 20, "every job claimed");
    assert_eq!(distinct.len(), 20, "no job claimed twice");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_pass_claims_min_of_callers_and_jobs() {
    let h = Harness::new().await;
    let svc = h.service(100);
    for post_ref in 0..3 {
        svc.enqueue(summarize_post(1, post_ref)).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..6 {
        let db = h.open_backend().await;
        handles.push(tokio::spawn(async move {
            db.claim_next(&format!("w{i}")).await.unwrap()
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(job) = tokio::time::timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap() {
            assert_eq!(job.status, JobStatus::Running);
            claimed.push(job.id);
        }
    }
    let distinct: HashSet<JobId> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 3);
    assert_eq!(distinct.len(), 3);
}

#[tokio::test]
async fn deal_analysis_end_to_end() {
    let h = Harness::new().await;
    h.seed(
        "INSERT INTO posts (id, author_id, title, content) VALUES (1, 10, 'Storage A', 'Deal post body');
         INSERT INTO posts (id, author_id, title, content) VALUES (2, 11, 'Storage B', 'Older');
         INSERT INTO deal_details (id, post_id, asset_class, thesis) VALUES (42, 1, 'self-storage', 'Buy and fix');
         INSERT INTO deal_details (id, post_id, asset_class, thesis) VALUES (41, 2, 'self-storage', 'Older thesis');
         INSERT INTO deal_outcomes (deal_id, outcome, key_lessons) VALUES (41, 'passed', 'Sponsor too green');",
    )
    .await;

    let svc = h.service(12);
    let job = svc.enqueue(analyze_deal(7, 42, None)).await.unwrap().job;

    let worker = h.worker(Capabilities::from_provider(Arc::new(StubLlm))).await;
    let done = worker.run_once().await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Done);
    assert!(done.output_text.as_deref().unwrap().starts_with("stub reply"));

    let structured: serde_json::Value =
        serde_json::from_str(done.output_structured.as_deref().unwrap()).unwrap();
    assert_eq!(structured["provider"], "stub");
    assert_eq!(structured["model"], "stub-model");
    assert_eq!(structured["used_memory"], true);

    let record = h.db.analysis_for_job(job.id).await.unwrap().unwrap();
    assert_eq!(record.deal_ref, 42);
    assert_eq!(record.created_by, 7);

    let status = svc.get_status(job.id).await.unwrap().unwrap();
    assert_eq!(status.result_ref, Some(record.id));

    assert_eq!(
        h.notifications().await,
        vec![
            (7, "AI analysis complete".to_string(), Some(1)),
            (
                10,
                "AI analysis complete (requested by another member)".to_string(),
                Some(1)
            ),
        ]
    );
}

#[tokio::test]
async fn input_is_read_at_execution_time() {
    let h = Harness::new().await;
    h.seed("INSERT INTO posts (id, author_id, title, content) VALUES (9, 3, 'Thread', 'first draft');")
        .await;
    let job = h.service(12).enqueue(summarize_post(3, 9)).await.unwrap().job;

    h.seed("UPDATE posts SET content = 'edited after enqueue' WHERE id = 9;")
        .await;

    let worker = h.worker(Capabilities::extractive()).await;
    let done = worker.run_once().await.unwrap().unwrap();
    assert_eq!(done.id, job.id);
    assert_eq!(done.output_text.as_deref(), Some("edited after enqueue"));
}

#[tokio::test]
async fn finished_job_can_be_resubmitted() {
    let h = Harness::new().await;
    h.seed("INSERT INTO posts (id, author_id, title, content) VALUES (9, 3, 'Thread', 'body');")
        .await;
    let svc = h.service(12);
    let first = svc.enqueue(summarize_post(3, 9)).await.unwrap().job;

    let worker = h.worker(Capabilities::extractive()).await;
    worker.run_once().await.unwrap().unwrap();

    let again = svc.enqueue(summarize_post(3, 9)).await.unwrap();
    assert!(!again.reused);
    assert_ne!(again.job.id, first.id);

    // The first job stays done.
    let first = h.db.get_job(first.id).await.unwrap().unwrap();
    assert_eq!(first.status, JobStatus::Done);
}

#[tokio::test]
async fn failed_record_append_fails_the_job() {
    let h = Harness::new().await;
    h.seed(
        "INSERT INTO posts (id, author_id, title, content) VALUES (1, 10, 'Storage A', 'Deal post body');
         INSERT INTO deal_details (id, post_id, asset_class, thesis) VALUES (42, 1, 'self-storage', 'Buy and fix');
         CREATE TRIGGER reject_analysis BEFORE INSERT ON analysis_records
         BEGIN SELECT RAISE(ABORT, 'analysis store offline'); END;",
    )
    .await;

    let svc = h.service(12);
    let job = svc.enqueue(analyze_deal(7, 42, None)).await.unwrap().job;

    let worker = h.worker(Capabilities::from_provider(Arc::new(StubLlm))).await;
    let failed = worker.run_once().await.unwrap().unwrap();
    assert_eq!(failed.id, job.id);
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("analysis store offline"));
    assert!(failed.output_text.is_none());
    assert!(failed.finished_at.is_some());

    assert!(h.db.analysis_for_job(job.id).await.unwrap().is_none());
    let status = svc.get_status(job.id).await.unwrap().unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.result_ref.is_none());
    assert!(h.notifications().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_enqueues_with_same_key_share_one_job() {
    let h = Harness::new().await;
    let limiter = || RateLimiter::new(Duration::from_secs(3600), 12);
    let left = EnqueueService::new(h.open_backend().await, limiter());
    let right = EnqueueService::new(h.open_backend().await, limiter());

    let (a, b) = tokio::join!(
        left.enqueue(analyze_deal(7, 42, Some("abc"))),
        right.enqueue(analyze_deal(7, 42, Some("abc"))),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.job.id, b.job.id);
    assert!(a.reused ^ b.reused, "exactly one side inserts");
    assert_eq!(h.job_count(7).await, 1);
}
