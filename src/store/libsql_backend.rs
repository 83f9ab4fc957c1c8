//! libSQL backend: async implementation of every store trait.
//!
//! Supports local file and in-memory databases. Several processes (or several
//! backends in one process) may open the same file; the claim is a single
//! conditional `UPDATE ... RETURNING`, so SQLite's write lock is the only
//! coordination needed.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::jobs::{
    AnalysisRecord, Job, JobId, JobKind, JobOutcome, NewAnalysisRecord, NewJob, TargetRefs,
};
use crate::store::migrations;
use crate::store::traits::{
    Deal, JobStore, NotificationSink, OutcomeMemory, Post, PriorOutcome, TargetStore,
};
use crate::worker::state::JobStatus;

/// How long a writer waits on another connection's lock before giving up.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use,
/// but `complete_job` opens a transaction on it, so each worker gets its own
/// backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.configure(true).await?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.configure(false).await?;
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Connection pragmas. Both return a row, so they go through `query`.
    async fn configure(&self, file_backed: bool) -> Result<(), DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to set busy_timeout: {e}")))?;
        let _ = rows.next().await;

        if file_backed {
            match self.conn().query("PRAGMA journal_mode = WAL", ()).await {
                Ok(mut rows) => {
                    let _ = rows.next().await;
                }
                Err(e) => warn!(error = %e, "Could not switch to WAL, keeping default journal"),
            }
        }
        Ok(())
    }

    /// Run a statement that returns at most one job row.
    async fn query_one_job(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<Job>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| map_write_err(op, e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(map_write_err(op, e)),
        }
    }

    async fn query_jobs(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Job>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut jobs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    /// Explain why a guarded transition matched no row.
    async fn transition_rejected(&self, id: JobId, target: JobStatus) -> DatabaseError {
        match self.get_job(id).await {
            Ok(Some(job)) if job.status.is_terminal() => DatabaseError::Constraint(format!(
                "job {id} already finished as {}, cannot transition to {target}",
                job.status
            )),
            Ok(Some(job)) if !job.status.can_transition_to(target) => {
                DatabaseError::Constraint(format!(
                    "job {id} is {}, cannot transition to {target}",
                    job.status
                ))
            }
            // The row allows the move now, so another writer changed it in between.
            Ok(Some(job)) => DatabaseError::Query(format!(
                "job {id} changed concurrently (now {}), transition to {target} not applied",
                job.status
            )),
            Ok(None) => DatabaseError::NotFound {
                entity: "job".to_string(),
                id: id.to_string(),
            },
            Err(e) => e,
        }
    }

    /// Body of `complete_job`; runs inside its transaction.
    async fn complete_in_tx(&self, id: JobId, outcome: &JobOutcome) -> Result<Job, DatabaseError> {
        let updated = self
            .query_one_job(
                "complete_job",
                &format!(
                    "UPDATE ai_jobs SET status = 'done', output_text = ?1, output_structured = ?2, finished_at = ?3 \
                     WHERE id = ?4 AND status = 'running' RETURNING {JOB_COLUMNS}"
                ),
                params![
                    outcome.output_text.as_str(),
                    outcome.output_structured.as_str(),
                    fmt_ts(Utc::now()),
                    id
                ],
            )
            .await?;

        let Some(job) = updated else {
            return Err(self.transition_rejected(id, JobStatus::Done).await);
        };

        // Only reached after this worker's guarded transition succeeded, so a
        // job never gets two records.
        if let Some(ref record) = outcome.analysis {
            let record_id = self.insert_analysis(id, record).await?;
            debug!(job_id = id, record_id, deal_ref = record.deal_ref, "Analysis record appended");
        }

        Ok(job)
    }

    async fn insert_analysis(
        &self,
        job_id: JobId,
        record: &NewAnalysisRecord,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO analysis_records (deal_ref, job_id, created_by, provider, model, output_text, output_structured, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) RETURNING id",
                params![
                    record.deal_ref,
                    job_id,
                    record.created_by,
                    record.provider.as_str(),
                    opt_text(record.model.as_deref()),
                    record.output_text.as_str(),
                    record.output_structured.as_str(),
                    fmt_ts(Utc::now())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_analysis: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_analysis: {e}")))?
            .ok_or_else(|| DatabaseError::Query("insert_analysis: no id returned".into()))?;
        row.get::<i64>(0)
            .map_err(|e| DatabaseError::Query(format!("insert_analysis row parse: {e}")))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format. Fixed width, so text order is time order.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

/// Map a libsql error, surfacing unique-index violations as `Constraint`.
fn map_write_err(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

const JOB_COLUMNS: &str = "id, job_type, status, submitter_id, post_ref, deal_ref, input_text, idempotency_key, request_fingerprint, output_text, output_structured, error, claimed_by, created_at, started_at, finished_at";

const ANALYSIS_COLUMNS: &str =
    "id, deal_ref, job_id, created_by, provider, model, output_text, output_structured, created_at";

/// Map a libsql Row to a Job. Column order matches JOB_COLUMNS.
fn row_to_job(row: &libsql::Row) -> Result<Job, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("job row parse: {e}"));

    let kind_str: String = row.get(1).map_err(parse)?;
    let status_str: String = row.get(2).map_err(parse)?;
    let created_str: String = row.get(13).map_err(parse)?;
    let started_str: Option<String> = row.get(14).ok();
    let finished_str: Option<String> = row.get(15).ok();

    Ok(Job {
        id: row.get(0).map_err(parse)?,
        kind: kind_str
            .parse::<JobKind>()
            .map_err(|k| DatabaseError::Serialization(format!("unknown job_type in row: {k}")))?,
        status: status_str
            .parse::<JobStatus>()
            .map_err(DatabaseError::Serialization)?,
        submitter_id: row.get(3).map_err(parse)?,
        targets: TargetRefs {
            post_ref: row.get::<i64>(4).ok(),
            deal_ref: row.get::<i64>(5).ok(),
        },
        input_text: row.get::<String>(6).ok(),
        idempotency_key: row.get::<String>(7).ok(),
        fingerprint: row.get(8).map_err(parse)?,
        output_text: row.get::<String>(9).ok(),
        output_structured: row.get::<String>(10).ok(),
        error: row.get::<String>(11).ok(),
        claimed_by: row.get::<String>(12).ok(),
        created_at: parse_datetime(&created_str),
        started_at: parse_optional_datetime(&started_str),
        finished_at: parse_optional_datetime(&finished_str),
    })
}

/// Column order matches ANALYSIS_COLUMNS.
fn row_to_analysis(row: &libsql::Row) -> Result<AnalysisRecord, libsql::Error> {
    let created_str: String = row.get(8)?;
    Ok(AnalysisRecord {
        id: row.get(0)?,
        deal_ref: row.get(1)?,
        job_id: row.get::<i64>(2).ok(),
        created_by: row.get(3)?,
        provider: row.get(4)?,
        model: row.get::<String>(5).ok(),
        output_text: row.get(6)?,
        output_structured: row.get::<String>(7).ok(),
        created_at: parse_datetime(&created_str),
    })
}

// ── JobStore ────────────────────────────────────────────────────────

#[async_trait]
impl JobStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::init_schema(self.conn()).await
    }

    async fn insert_job(&self, job: &NewJob) -> Result<Job, DatabaseError> {
        let inserted = self
            .query_one_job(
                "insert_job",
                &format!(
                    "INSERT INTO ai_jobs (job_type, status, submitter_id, post_ref, deal_ref, input_text, idempotency_key, request_fingerprint, created_at) \
                     VALUES (?1, 'queued', ?2, ?3, ?4, ?5, ?6, ?7, ?8) RETURNING {JOB_COLUMNS}"
                ),
                params![
                    job.kind.as_str(),
                    job.submitter_id,
                    opt_int(job.targets.post_ref),
                    opt_int(job.targets.deal_ref),
                    opt_text(job.input_text.as_deref()),
                    opt_text(job.idempotency_key.as_deref()),
                    job.fingerprint.as_str(),
                    fmt_ts(job.created_at)
                ],
            )
            .await?
            .ok_or_else(|| DatabaseError::Query("insert_job: no row returned".into()))?;

        debug!(job_id = inserted.id, job_type = %inserted.kind, "Job inserted into DB");
        Ok(inserted)
    }

    async fn find_active_by_idempotency_key(
        &self,
        submitter_id: i64,
        kind: JobKind,
        idempotency_key: &str,
    ) -> Result<Option<Job>, DatabaseError> {
        self.query_one_job(
            "find_active_by_idempotency_key",
            &format!(
                "SELECT {JOB_COLUMNS} FROM ai_jobs \
                 WHERE submitter_id = ?1 AND job_type = ?2 AND idempotency_key = ?3 \
                 AND status IN ('queued', 'running') \
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            params![submitter_id, kind.as_str(), idempotency_key],
        )
        .await
    }

    async fn find_active_by_fingerprint(
        &self,
        submitter_id: i64,
        kind: JobKind,
        fingerprint: &str,
    ) -> Result<Option<Job>, DatabaseError> {
        self.query_one_job(
            "find_active_by_fingerprint",
            &format!(
                "SELECT {JOB_COLUMNS} FROM ai_jobs \
                 WHERE submitter_id = ?1 AND job_type = ?2 AND request_fingerprint = ?3 \
                 AND status IN ('queued', 'running') \
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            params![submitter_id, kind.as_str(), fingerprint],
        )
        .await
    }

    async fn count_created_since(
        &self,
        submitter_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM ai_jobs WHERE submitter_id = ?1 AND created_at >= ?2",
                params![submitter_id, fmt_ts(since)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_created_since: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count_created_since: {e}")))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_created_since: {e}"))),
        }
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, DatabaseError> {
        // Select-and-mark in one statement: the subquery and the update run
        // under the same write lock, and the `status = 'queued'` guard makes a
        // lost race match zero rows instead of stealing the job.
        let claimed = self
            .query_one_job(
                "claim_next",
                &format!(
                    "UPDATE ai_jobs SET status = 'running', started_at = ?1, claimed_by = ?2 \
                     WHERE id = (SELECT id FROM ai_jobs WHERE status = 'queued' ORDER BY created_at ASC, id ASC LIMIT 1) \
                     AND status = 'queued' \
                     RETURNING {JOB_COLUMNS}"
                ),
                params![fmt_ts(Utc::now()), worker_id],
            )
            .await?;

        if let Some(ref job) = claimed {
            debug!(job_id = job.id, worker_id, "Job claimed in DB");
        }
        Ok(claimed)
    }

    async fn complete_job(&self, id: JobId, outcome: &JobOutcome) -> Result<Job, DatabaseError> {
        // Status and analysis record commit together; on error the job stays Running.
        let tx = self
            .conn()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| map_write_err("complete_job begin", e))?;

        match self.complete_in_tx(id, outcome).await {
            Ok(job) => {
                tx.commit()
                    .await
                    .map_err(|e| map_write_err("complete_job commit", e))?;
                Ok(job)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(job_id = id, error = %rollback_err, "complete_job rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn fail_job(&self, id: JobId, error: &str) -> Result<Job, DatabaseError> {
        let updated = self
            .query_one_job(
                "fail_job",
                &format!(
                    "UPDATE ai_jobs SET status = 'failed', error = ?1, finished_at = ?2 \
                     WHERE id = ?3 AND status = 'running' RETURNING {JOB_COLUMNS}"
                ),
                params![error, fmt_ts(Utc::now()), id],
            )
            .await?;

        match updated {
            Some(job) => Ok(job),
            None => Err(self.transition_rejected(id, JobStatus::Failed).await),
        }
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, DatabaseError> {
        self.query_one_job(
            "get_job",
            &format!("SELECT {JOB_COLUMNS} FROM ai_jobs WHERE id = ?1"),
            params![id],
        )
        .await
    }

    async fn analysis_for_job(&self, job_id: JobId) -> Result<Option<AnalysisRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ANALYSIS_COLUMNS} FROM analysis_records WHERE job_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                params![job_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("analysis_for_job: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_analysis(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("analysis_for_job row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("analysis_for_job: {e}"))),
        }
    }

    async fn list_analyses(&self, deal_ref: i64) -> Result<Vec<AnalysisRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ANALYSIS_COLUMNS} FROM analysis_records WHERE deal_ref = ?1 ORDER BY created_at DESC, id DESC"
                ),
                params![deal_ref],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_analyses: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_analysis(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping analysis row: {e}");
                }
            }
        }
        Ok(records)
    }

    async fn stale_running(&self, started_before: DateTime<Utc>) -> Result<Vec<Job>, DatabaseError> {
        self.query_jobs(
            "stale_running",
            &format!(
                "SELECT {JOB_COLUMNS} FROM ai_jobs WHERE status = 'running' AND started_at < ?1 ORDER BY started_at ASC"
            ),
            params![fmt_ts(started_before)],
        )
        .await
    }
}

// ── Host-owned tables ───────────────────────────────────────────────

#[async_trait]
impl TargetStore for LibSqlBackend {
    async fn post(&self, post_ref: i64) -> Result<Option<Post>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, author_id, content FROM posts WHERE id = ?1",
                params![post_ref],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("post: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Post {
                id: row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("post row parse: {e}")))?,
                author_id: row.get::<i64>(1).ok(),
                content: row.get::<String>(2).ok(),
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("post: {e}"))),
        }
    }

    async fn deal(&self, deal_ref: i64) -> Result<Option<Deal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, post_id, asset_class, strategy, location, time_horizon_months, target_irr, \
                 target_multiple, minimum_investment, sponsor_name, thesis, key_risks, diligence_needed \
                 FROM deal_details WHERE id = ?1",
                params![deal_ref],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("deal: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("deal: {e}"))),
        };
        let parse = |e: libsql::Error| DatabaseError::Query(format!("deal row parse: {e}"));

        Ok(Some(Deal {
            id: row.get(0).map_err(parse)?,
            post_ref: row.get::<i64>(1).ok(),
            asset_class: row.get(2).map_err(parse)?,
            strategy: row.get::<String>(3).ok(),
            location: row.get::<String>(4).ok(),
            time_horizon_months: row.get::<i64>(5).ok(),
            target_irr: row.get::<f64>(6).ok(),
            target_multiple: row.get::<f64>(7).ok(),
            minimum_investment: row.get::<i64>(8).ok(),
            sponsor_name: row.get::<String>(9).ok(),
            thesis: row.get::<String>(10).unwrap_or_default(),
            key_risks: row.get::<String>(11).ok(),
            diligence_needed: row.get::<String>(12).ok(),
        }))
    }
}

#[async_trait]
impl OutcomeMemory for LibSqlBackend {
    /// Similarity is "same asset class, different deal", newest outcome first.
    async fn similar_outcomes(
        &self,
        deal_ref: i64,
        limit: usize,
    ) -> Result<Vec<PriorOutcome>, DatabaseError> {
        let limit = limit.clamp(1, 20) as i64;
        let mut rows = self
            .conn()
            .query(
                "SELECT o.deal_id, p.title, o.outcome, o.key_lessons \
                 FROM deal_outcomes o \
                 JOIN deal_details d ON o.deal_id = d.id \
                 LEFT JOIN posts p ON d.post_id = p.id \
                 WHERE d.id != ?1 \
                 AND d.asset_class = (SELECT asset_class FROM deal_details WHERE id = ?1) \
                 ORDER BY o.created_at DESC, o.id DESC \
                 LIMIT ?2",
                params![deal_ref, limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("similar_outcomes: {e}")))?;

        let mut outcomes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("similar_outcomes: {e}")))?
        {
            outcomes.push(PriorOutcome {
                deal_ref: row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("similar_outcomes row parse: {e}")))?,
                title: row.get::<String>(1).ok(),
                outcome: row.get::<String>(2).ok(),
                key_lessons: row.get::<String>(3).ok(),
            });
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl NotificationSink for LibSqlBackend {
    async fn notify(
        &self,
        recipient_id: i64,
        message: &str,
        related_ref: Option<i64>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO notifications (recipient_id, notification_type, message, related_post_id, created_at) \
                 VALUES (?1, 'ai_complete', ?2, ?3, ?4)",
                params![recipient_id, message, opt_int(related_ref), fmt_ts(Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("notify: {e}")))?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
