//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Queue-level settings shared by the enqueue service and workers.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Database file shared by every worker.
    pub db_path: PathBuf,
    /// Trailing window for the per-submitter rate limit.
    pub rate_window: Duration,
    /// Jobs a submitter may create inside `rate_window`.
    pub max_jobs_per_window: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/ai-jobs.db"),
            rate_window: Duration::from_secs(3600), // 1 hour
            max_jobs_per_window: 12,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            db_path: std::env::var("AI_JOBS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            rate_window: Duration::from_secs(env_or(
                "AI_JOBS_RATE_WINDOW_SECS",
                defaults.rate_window.as_secs(),
            )?),
            max_jobs_per_window: env_or(
                "AI_JOBS_RATE_MAX_PER_WINDOW",
                defaults.max_jobs_per_window,
            )?,
        })
    }
}

/// Worker loop settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// How many prior outcomes to feed into deal analysis.
    pub memory_limit: usize,
    /// Running jobs older than this are reported as stale (never reclaimed).
    pub stale_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            memory_limit: 5,
            stale_after: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let memory_limit: usize = env_or("AI_JOBS_MEMORY_LIMIT", defaults.memory_limit)?;
        Ok(Self {
            poll_interval: Duration::from_millis(env_or(
                "AI_JOBS_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            memory_limit: memory_limit.clamp(1, 20),
            stale_after: Duration::from_secs(env_or(
                "AI_JOBS_STALE_AFTER_SECS",
                defaults.stale_after.as_secs(),
            )?),
        })
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
///
/// A set-but-unparseable value is an error rather than a silent default.
fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        Err(_) => Ok(default),
    }
}
