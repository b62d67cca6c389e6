use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use outpost_core::JobId;
use outpost_intents::JobPayload;

use super::types::JobExecution;

/// Scheduler call failure.
///
/// Every variant leaves the outbox row in place; `is_retryable` tells apart
/// conditions expected to clear on their own from outright rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The key is held by a job with a different definition.
    #[error("job key already in use: {0}")]
    DuplicateKey(JobId),

    #[error("scheduler rejected job: {0}")]
    Rejected(String),

    #[error("scheduler unavailable: {0}")]
    Unavailable(String),

    #[error("scheduler call timed out after {0:?}")]
    Timeout(Duration),
}

impl SchedulerError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::DuplicateKey(_)
                | SchedulerError::Unavailable(_)
                | SchedulerError::Timeout(_)
        )
    }
}

/// Adapter over an external time-based job scheduler.
///
/// Implementations must:
/// - treat re-registration of an identical job as success (an intent may be
///   delivered twice if the drainer crashes between dispatch and delete)
/// - treat `cancel` of an absent key as success
/// - never run two executions of the same key concurrently
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Register a one-shot job that fires at `fire_time`.
    async fn schedule_one_time(
        &self,
        job_id: &JobId,
        fire_time: DateTime<Utc>,
        payload: &JobPayload,
    ) -> Result<(), SchedulerError>;

    /// Remove a pending job by key. No-op if the key does not exist.
    async fn cancel(&self, job_id: &JobId) -> Result<(), SchedulerError>;

    /// Remove every pending job. Returns how many were removed.
    async fn delete_all_jobs(&self) -> Result<usize, SchedulerError>;
}

#[async_trait]
impl<J> JobScheduler for Arc<J>
where
    J: JobScheduler + ?Sized,
{
    async fn schedule_one_time(
        &self,
        job_id: &JobId,
        fire_time: DateTime<Utc>,
        payload: &JobPayload,
    ) -> Result<(), SchedulerError> {
        (**self).schedule_one_time(job_id, fire_time, payload).await
    }

    async fn cancel(&self, job_id: &JobId) -> Result<(), SchedulerError> {
        (**self).cancel(job_id).await
    }

    async fn delete_all_jobs(&self) -> Result<usize, SchedulerError> {
        (**self).delete_all_jobs().await
    }
}

/// Code run by the scheduler when a job fires.
///
/// There is no error channel back to the scheduler: a fired job counts as
/// complete whatever the handler does.
#[async_trait]
pub trait ScheduledJobHandler: Send + Sync {
    async fn execute(&self, execution: &JobExecution);
}
