//! Scheduled job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use outpost_core::JobId;
use outpost_intents::JobPayload;

/// A one-time job registered with a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Job key
    pub job_id: JobId,
    /// When the job should fire
    pub fire_time: DateTime<Utc>,
    /// Opaque job data handed to the handler
    pub payload: JobPayload,
    /// When the job was registered
    pub registered_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(job_id: JobId, fire_time: DateTime<Utc>, payload: JobPayload) -> Self {
        Self {
            job_id,
            fire_time,
            payload,
            registered_at: Utc::now(),
        }
    }

    /// Same key, fire time and payload. Registration time is ignored.
    pub fn same_definition(&self, fire_time: DateTime<Utc>, payload: &JobPayload) -> bool {
        self.fire_time == fire_time && &self.payload == payload
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_time <= now
    }
}

/// What a handler receives when a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobExecution {
    pub job_id: JobId,
    pub fire_time: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
    pub payload: JobPayload,
}

impl JobExecution {
    pub fn from_job(job: &ScheduledJob, fired_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            fire_time: job.fire_time,
            fired_at,
            payload: job.payload.clone(),
        }
    }
}
