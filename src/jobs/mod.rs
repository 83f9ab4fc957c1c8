//! Job model and the enqueue side of the queue.

pub mod enqueue;
pub mod fingerprint;
pub mod model;
pub mod rate_limit;

pub use enqueue::{EnqueueRequest, EnqueueService, Enqueued};
pub use fingerprint::request_fingerprint;
pub use model::{
    AnalysisRecord, Job, JobId, JobKind, JobOutcome, JobStatusView, NewAnalysisRecord, NewJob,
    TargetRefs,
};
pub use rate_limit::RateLimiter;
