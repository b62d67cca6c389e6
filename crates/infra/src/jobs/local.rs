//! In-process job scheduler for tests/dev.
//!
//! It has no timer of its own: due jobs fire only when [`LocalJobScheduler::fire_due`]
//! is called (or a job is triggered manually), which keeps tests deterministic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use outpost_core::JobId;
use outpost_intents::JobPayload;

use super::scheduler::{JobScheduler, ScheduledJobHandler, SchedulerError};
use super::types::{JobExecution, ScheduledJob};

/// Handler registry key matching every job.
pub const WILDCARD: &str = "*";

/// In-memory one-time job scheduler.
pub struct LocalJobScheduler {
    jobs: RwLock<BTreeMap<JobId, ScheduledJob>>,
    handlers: RwLock<HashMap<String, Arc<dyn ScheduledJobHandler>>>,
    /// One async lock per key currently executing; serializes executions.
    running: Mutex<HashMap<JobId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for LocalJobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for LocalJobScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LocalJobScheduler")
            .field("jobs", &self.len())
            .finish_non_exhaustive()
    }
}

impl LocalJobScheduler {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            handlers: RwLock::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a handler for jobs whose key prefix is `prefix`
    /// (e.g. `JobKind::prefix()`), or for every job with [`WILDCARD`].
    pub fn register_handler(&self, prefix: impl Into<String>, handler: Arc<dyn ScheduledJobHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(prefix.into(), handler);
    }

    pub fn get(&self, job_id: &JobId) -> Option<ScheduledJob> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire every job due at `now`, oldest fire time first.
    ///
    /// Due jobs are removed before they run, so each fires once. Returns how
    /// many fired.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let mut due: Vec<ScheduledJob> = {
            let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
            let keys: Vec<JobId> = jobs
                .values()
                .filter(|j| j.is_due(now))
                .map(|j| j.job_id.clone())
                .collect();
            keys.iter().filter_map(|k| jobs.remove(k)).collect()
        };
        due.sort_by_key(|j| j.fire_time);

        for job in &due {
            self.execute(JobExecution::from_job(job, now)).await;
        }
        due.len()
    }

    /// Run a pending job right now without removing it.
    ///
    /// Returns `false` if no job is registered under `job_id`.
    pub async fn trigger_now(&self, job_id: &JobId) -> bool {
        let Some(job) = self.get(job_id) else {
            return false;
        };
        self.execute(JobExecution::from_job(&job, Utc::now())).await;
        true
    }

    async fn execute(&self, execution: JobExecution) {
        let Some(handler) = self.handler_for(&execution.job_id) else {
            warn!(job_id = %execution.job_id, "no handler registered for fired job");
            return;
        };

        let lock = self.key_lock(&execution.job_id);
        {
            let _running = lock.lock().await;
            debug!(job_id = %execution.job_id, "executing scheduled job");
            handler.execute(&execution).await;
        }
        drop(lock);
        self.release_key_lock(&execution.job_id);
    }

    fn handler_for(&self, job_id: &JobId) -> Option<Arc<dyn ScheduledJobHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);

        if let Some((kind, _)) = job_id.decompose() {
            if let Some(h) = handlers.get(kind.prefix()) {
                return Some(h.clone());
            }
        }

        handlers.get(WILDCARD).cloned()
    }

    fn key_lock(&self, job_id: &JobId) -> Arc<tokio::sync::Mutex<()>> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job_id.clone())
            .or_default()
            .clone()
    }

    fn release_key_lock(&self, job_id: &JobId) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running
            .get(job_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            running.remove(job_id);
        }
    }
}

#[async_trait]
impl JobScheduler for LocalJobScheduler {
    async fn schedule_one_time(
        &self,
        job_id: &JobId,
        fire_time: DateTime<Utc>,
        payload: &JobPayload,
    ) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = jobs.get(job_id) {
            if existing.same_definition(fire_time, payload) {
                debug!(job_id = %job_id, "job already scheduled; ignoring redelivery");
                return Ok(());
            }
            return Err(SchedulerError::DuplicateKey(job_id.clone()));
        }

        jobs.insert(
            job_id.clone(),
            ScheduledJob::new(job_id.clone(), fire_time, payload.clone()),
        );
        info!(job_id = %job_id, fire_time = %fire_time, "one-time job scheduled");
        Ok(())
    }

    async fn cancel(&self, job_id: &JobId) -> Result<(), SchedulerError> {
        let removed = self
            .jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);

        match removed {
            Some(_) => info!(job_id = %job_id, "scheduled job cancelled"),
            None => debug!(job_id = %job_id, "cancel for unknown job ignored"),
        }
        Ok(())
    }

    async fn delete_all_jobs(&self) -> Result<usize, SchedulerError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let count = jobs.len();
        jobs.clear();
        Ok(count)
    }
}
