//! Per-submitter sliding-window rate limit.
//!
//! There is no counter table: the count is derived from the job rows
//! themselves, so every enqueue path sees the same number.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::QueueConfig;
use crate::error::EnqueueError;
use crate::store::JobStore;

#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    window: Duration,
    max_per_window: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_per_window: u32) -> Self {
        Self {
            window,
            max_per_window,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.rate_window, config.max_jobs_per_window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    /// Fail with `RateLimited` when the submitter already created
    /// `max_per_window` jobs (any status) within the window ending at `now`.
    ///
    /// Not atomic with the insert that follows; concurrent enqueues from one
    /// submitter can overshoot the cap by the number racing.
    pub async fn check(
        &self,
        store: &dyn JobStore,
        submitter_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), EnqueueError> {
        let window = chrono::Duration::from_std(self.window)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let since = now - window;
        let recent = store.count_created_since(submitter_id, since).await?;

        if recent >= u64::from(self.max_per_window) {
            warn!(
                submitter_id,
                recent,
                limit = self.max_per_window,
                "Submitter rate limited"
            );
            return Err(EnqueueError::RateLimited {
                submitter_id,
                limit: self.max_per_window,
                window_secs: self.window.as_secs(),
            });
        }
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
