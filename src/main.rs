use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use ai_jobs::config::{QueueConfig, WorkerConfig};
use ai_jobs::jobs::{EnqueueRequest, EnqueueService, RateLimiter, TargetRefs};
use ai_jobs::llm::{LlmConfig, create_capabilities};
use ai_jobs::store::{JobStore, LibSqlBackend};
use ai_jobs::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "ai-jobs", version, about = "Durable queue for AI summarization and deal analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run worker loops until Ctrl-C.
    Worker {
        /// Independent workers, each with its own connection.
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
    /// Submit a job and print `{job_id, status, reused}`.
    Enqueue {
        #[arg(long)]
        job_type: String,
        #[arg(long)]
        submitter: i64,
        #[arg(long)]
        post: Option<i64>,
        #[arg(long)]
        deal: Option<i64>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Print the status of a job.
    Status { job_id: i64 },
    /// List running jobs older than the stale threshold.
    Stale,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let queue_config = QueueConfig::from_env()?;
    let worker_config = WorkerConfig::from_env()?;

    match cli.command {
        Command::Worker { workers } => run_workers(&queue_config, worker_config, workers).await,
        Command::Enqueue {
            job_type,
            submitter,
            post,
            deal,
            text,
            idempotency_key,
        } => {
            let db = open(&queue_config.db_path).await?;
            let service = EnqueueService::new(db, RateLimiter::from_config(&queue_config));
            let enqueued = service
                .enqueue(EnqueueRequest {
                    job_type,
                    submitter_id: submitter,
                    input_text: text,
                    targets: TargetRefs {
                        post_ref: post,
                        deal_ref: deal,
                    },
                    idempotency_key,
                })
                .await?;
            let out = serde_json::json!({
                "job_id": enqueued.job.id,
                "status": enqueued.job.status,
                "reused": enqueued.reused,
            });
            println!("{out}");
            Ok(())
        }
        Command::Status { job_id } => {
            let db = open(&queue_config.db_path).await?;
            let service = EnqueueService::new(db, RateLimiter::from_config(&queue_config));
            let view = service
                .get_status(job_id)
                .await?
                .with_context(|| format!("job {job_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::Stale => {
            let db = open(&queue_config.db_path).await?;
            let threshold = chrono::Duration::from_std(worker_config.stale_after)
                .context("stale threshold out of range")?;
            let stale = db.stale_running(chrono::Utc::now() - threshold).await?;
            println!("{}", serde_json::to_string_pretty(&stale)?);
            Ok(())
        }
    }
}

/// Console logging to stderr, plus a daily rolling file when `AI_JOBS_LOG_DIR` is set.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("AI_JOBS_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "ai-jobs.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

async fn open(path: &Path) -> anyhow::Result<Arc<LibSqlBackend>> {
    let backend = LibSqlBackend::new_local(path)
        .await
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    Ok(Arc::new(backend))
}

async fn run_workers(
    queue_config: &QueueConfig,
    worker_config: WorkerConfig,
    workers: usize,
) -> anyhow::Result<()> {
    let llm_config = LlmConfig::from_env()?;
    let capabilities = create_capabilities(llm_config.as_ref())?;

    eprintln!("🧵 ai-jobs v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", queue_config.db_path.display());
    eprintln!(
        "   Model: {}",
        llm_config
            .as_ref()
            .map(|c| c.model.as_str())
            .unwrap_or("extractive fallback")
    );
    eprintln!("   Workers: {}", workers.max(1));
    eprintln!("   Press Ctrl-C to stop.\n");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested, finishing in-flight jobs");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut handles = Vec::with_capacity(workers.max(1));
    for _ in 0..workers.max(1) {
        let db = open(&queue_config.db_path).await?;
        let worker = Worker::from_backend(db, capabilities.clone(), worker_config.clone());
        handles.push(worker.spawn(Arc::clone(&shutdown)));
    }

    for result in join_all(handles).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
    Ok(())
}
