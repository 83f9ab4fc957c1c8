//! Completion notifications. Never affect job status.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{DatabaseError, SideEffectError};
use crate::jobs::Job;
use crate::store::{NotificationSink, TargetStore};

/// Appended to the message sent to a target owner who did not submit the job.
pub const OTHER_REQUESTER_SUFFIX: &str = " (requested by another member)";

pub struct SideEffectDispatcher {
    targets: Arc<dyn TargetStore>,
    sink: Arc<dyn NotificationSink>,
}

impl SideEffectDispatcher {
    pub fn new(targets: Arc<dyn TargetStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { targets, sink }
    }

    /// Notify the submitter and, if different, the owner of the target post.
    /// Every failure is logged and dropped.
    pub async fn on_complete(&self, job: &Job) {
        let message = job.kind.completion_message();

        let related_post = match self.related_post(job).await {
            Ok(post) => post,
            Err(e) => {
                warn!(job_id = job.id, error = %SideEffectError::from(e), "Could not resolve related post");
                None
            }
        };

        if let Err(e) = self.send(job.submitter_id, message, related_post).await {
            warn!(job_id = job.id, error = %e, "Submitter notification failed");
        }

        let Some(post_ref) = related_post else {
            return;
        };
        let owner = match self.targets.post(post_ref).await {
            Ok(post) => post.and_then(|p| p.author_id),
            Err(e) => {
                warn!(job_id = job.id, error = %SideEffectError::from(e), "Could not load post owner");
                None
            }
        };

        if let Some(owner_id) = owner.filter(|id| *id != job.submitter_id) {
            let message = format!("{message}{OTHER_REQUESTER_SUFFIX}");
            if let Err(e) = self.send(owner_id, &message, related_post).await {
                warn!(job_id = job.id, error = %e, "Owner notification failed");
            }
        }
    }

    /// The deal's post for deal jobs, otherwise the job's post.
    async fn related_post(&self, job: &Job) -> Result<Option<i64>, DatabaseError> {
        match job.targets.deal_ref {
            Some(deal_ref) => Ok(self.targets.deal(deal_ref).await?.and_then(|d| d.post_ref)),
            None => Ok(job.targets.post_ref),
        }
    }

    async fn send(
        &self,
        recipient_id: i64,
        message: &str,
        related_ref: Option<i64>,
    ) -> Result<(), SideEffectError> {
        self.sink
            .notify(recipient_id, message, related_ref)
            .await
            .map_err(|e| SideEffectError::Notify {
                recipient_id,
                reason: e.to_string(),
            })?;
        debug!(recipient_id, message, "Notification sent");
        Ok(())
    }
}
