//! Poll, claim, execute, write back.
//!
//! One job at a time per worker. Workers share nothing in memory; run as
//! many as you like, in one process or many, against the same database.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{DatabaseError, bounded_error_text};
use crate::jobs::Job;
use crate::llm::Capabilities;
use crate::store::{JobStore, LibSqlBackend};
use crate::worker::executor::Executor;
use crate::worker::side_effects::SideEffectDispatcher;

pub struct Worker {
    worker_id: String,
    store: Arc<dyn JobStore>,
    executor: Executor,
    dispatcher: SideEffectDispatcher,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Executor,
        dispatcher: SideEffectDispatcher,
        config: WorkerConfig,
    ) -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            store,
            executor,
            dispatcher,
            config,
        }
    }

    /// Wire every collaborator to one libSQL backend.
    pub fn from_backend(
        backend: Arc<LibSqlBackend>,
        capabilities: Capabilities,
        config: WorkerConfig,
    ) -> Self {
        let executor = Executor::new(
            backend.clone(),
            backend.clone(),
            capabilities,
            config.memory_limit,
        );
        let dispatcher = SideEffectDispatcher::new(backend.clone(), backend.clone());
        Self::new(backend, executor, dispatcher, config)
    }

    pub fn id(&self) -> &str {
        &self.worker_id
    }

    /// Claim and fully process at most one job.
    ///
    /// Returns the job in its terminal state, or `None` if the queue was empty.
    pub async fn run_once(&self) -> Result<Option<Job>, DatabaseError> {
        let Some(job) = self.store.claim_next(&self.worker_id).await? else {
            return Ok(None);
        };

        info!(
            job_id = job.id,
            job_type = %job.kind,
            submitter_id = job.submitter_id,
            worker_id = %self.worker_id,
            "Job claimed"
        );

        self.process(job).await.map(Some)
    }

    async fn process(&self, job: Job) -> Result<Job, DatabaseError> {
        let outcome = match self.executor.execute(&job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = bounded_error_text(&e.to_string());
                warn!(job_id = job.id, job_type = %job.kind, error = %message, "Job failed");
                return self.store.fail_job(job.id, &message).await;
            }
        };

        let done = match self.store.complete_job(job.id, &outcome).await {
            Ok(done) => done,
            Err(e) => {
                error!(job_id = job.id, error = %e, "Failed to persist job result");
                // complete_job rolled back, so the job is still Running.
                let message = bounded_error_text(&format!("failed to persist result: {e}"));
                return match self.store.fail_job(job.id, &message).await {
                    Ok(failed) => Ok(failed),
                    Err(fail_err) => {
                        warn!(job_id = job.id, error = %fail_err, "Could not mark job failed");
                        Err(e)
                    }
                };
            }
        };

        info!(job_id = done.id, job_type = %done.kind, "Job done");
        self.dispatcher.on_complete(&done).await;
        Ok(done)
    }

    /// Log `Running` jobs older than the stale threshold. Never touches them.
    pub async fn report_stale(&self) -> usize {
        let threshold = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let before = chrono::Utc::now() - threshold;

        match self.store.stale_running(before).await {
            Ok(stale) => {
                for job in &stale {
                    warn!(
                        job_id = job.id,
                        job_type = %job.kind,
                        claimed_by = job.claimed_by.as_deref().unwrap_or("unknown"),
                        started_at = ?job.started_at,
                        "Job stuck in running; needs manual recovery"
                    );
                }
                stale.len()
            }
            Err(e) => {
                warn!(error = %e, "Failed to list stale running jobs");
                0
            }
        }
    }

    /// Loop until `shutdown` is set. A job in flight always finishes first.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(
            worker_id = %self.worker_id,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "Worker started"
        );
        self.report_stale().await;

        while !shutdown.load(Ordering::Relaxed) {
            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!(worker_id = %self.worker_id, error = %e, "Worker poll failed"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        info!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// Run the loop on its own task.
    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
