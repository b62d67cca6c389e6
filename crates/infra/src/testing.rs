//! Test doubles shared by unit and integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use outpost_core::{CorrelationContext, EntityId, JobId, OutboxMessageId};
use outpost_intents::{JobPayload, NewOutboxMessage, OutboxMessage};

use crate::jobs::{JobScheduler, SchedulerError, TransmissionStartAction};
use crate::outbox::{InMemoryOutboxStore, InMemoryTransaction, OutboxStore, OutboxStoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCall {
    Schedule {
        job_id: JobId,
        fire_time: DateTime<Utc>,
        payload: JobPayload,
    },
    Cancel(JobId),
    DeleteAll,
}

/// Scheduler that records every call and can be told to fail or stall.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    calls: Mutex<Vec<SchedulerCall>>,
    failure: Mutex<Option<SchedulerError>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SchedulerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Fail every call with `err` until cleared with `None`.
    pub fn set_failure(&self, err: Option<SchedulerError>) {
        *self.failure.lock().unwrap() = err;
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn enter(&self, call: SchedulerCall) -> Result<(), SchedulerError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl JobScheduler for RecordingScheduler {
    async fn schedule_one_time(
        &self,
        job_id: &JobId,
        fire_time: DateTime<Utc>,
        payload: &JobPayload,
    ) -> Result<(), SchedulerError> {
        self.enter(SchedulerCall::Schedule {
            job_id: job_id.clone(),
            fire_time,
            payload: payload.clone(),
        })
        .await
    }

    async fn cancel(&self, job_id: &JobId) -> Result<(), SchedulerError> {
        self.enter(SchedulerCall::Cancel(job_id.clone())).await
    }

    async fn delete_all_jobs(&self) -> Result<usize, SchedulerError> {
        self.enter(SchedulerCall::DeleteAll).await.map(|()| 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedTransmission {
    pub correlation_id: Option<String>,
    pub transmission_id: EntityId,
    pub start_time: DateTime<Utc>,
}

/// Downstream action that records what it was asked to start.
#[derive(Debug, Default)]
pub struct RecordingAction {
    started: Mutex<Vec<StartedTransmission>>,
}

impl RecordingAction {
    pub fn started(&self) -> Vec<StartedTransmission> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransmissionStartAction for RecordingAction {
    async fn on_transmission_started(
        &self,
        ctx: &CorrelationContext,
        transmission_id: EntityId,
        start_time: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.started.lock().unwrap().push(StartedTransmission {
            correlation_id: ctx.correlation_id().map(|c| c.as_str().to_string()),
            transmission_id,
            start_time,
        });
        Ok(())
    }
}

/// In-memory outbox whose operations can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct FailingOutboxStore {
    inner: InMemoryOutboxStore,
    fail_append: Arc<AtomicBool>,
    fail_peek: Arc<AtomicBool>,
    fail_delete: Arc<AtomicBool>,
}

impl FailingOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryOutboxStore {
        &self.inner
    }

    pub fn begin(&self) -> InMemoryTransaction {
        self.inner.begin()
    }

    pub fn fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    pub fn fail_peek(&self, fail: bool) {
        self.fail_peek.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, operation: &'static str) -> Result<(), OutboxStoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(OutboxStoreError::Unavailable {
                operation,
                message: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for FailingOutboxStore {
    type Tx = InMemoryTransaction;

    async fn append(
        &self,
        tx: &mut InMemoryTransaction,
        message: NewOutboxMessage,
    ) -> Result<OutboxMessageId, OutboxStoreError> {
        Self::check(&self.fail_append, "append")?;
        self.inner.append(tx, message).await
    }

    async fn peek_oldest(&self) -> Result<Option<OutboxMessage>, OutboxStoreError> {
        Self::check(&self.fail_peek, "peek_oldest")?;
        self.inner.peek_oldest().await
    }

    async fn delete(&self, id: OutboxMessageId) -> Result<(), OutboxStoreError> {
        Self::check(&self.fail_delete, "delete")?;
        self.inner.delete(id).await
    }
}
