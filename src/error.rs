//! Error types for the AI job queue.

use std::time::Duration;

/// Maximum length (in chars) of the error text persisted on a failed job.
pub const MAX_ERROR_CHARS: usize = 2000;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Synchronous, enqueue-time errors. Nothing is persisted when these occur.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("invalid job type: {0}")]
    InvalidJobType(String),

    #[error("rate limited: submitter {submitter_id} reached {limit} jobs per {window_secs}s")]
    RateLimited {
        submitter_id: i64,
        limit: u32,
        window_secs: u64,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Asynchronous, execution-time errors. These end up in the job's `error` column.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("missing input text")]
    MissingInput,

    #[error("{0}")]
    Execution(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<LlmError> for JobError {
    fn from(e: LlmError) -> Self {
        Self::Execution(e.to_string())
    }
}

/// Failures of completion side effects. Logged and discarded.
#[derive(Debug, thiserror::Error)]
pub enum SideEffectError {
    #[error("notification to {recipient_id} failed: {reason}")]
    Notify { recipient_id: i64, reason: String },

    #[error("target lookup failed: {0}")]
    Lookup(#[from] DatabaseError),
}

/// Cut error text down to [`MAX_ERROR_CHARS`] characters.
pub fn bounded_error_text(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_CHARS) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
