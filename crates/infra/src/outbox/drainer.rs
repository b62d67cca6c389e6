//! Outbox drainer: applies queued intents to the job scheduler in commit order.
//!
//! One step is peek → decode → dispatch → delete. The row is deleted only
//! after the scheduler accepted it, so a crash in between re-delivers the
//! intent on the next cycle (at-least-once; the scheduler treats identical
//! re-registration as success).
//!
//! Any failure ends the cycle and leaves the row at the head.

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use outpost_core::{JobId, OutboxMessageId};
use outpost_intents::{CodecError, Intent, IntentKind, OutboxMessage};

use super::store::{OutboxStore, OutboxStoreError};
use super::stuck::{StuckHead, StuckHeadMonitor};
use crate::config::DrainerConfig;
use crate::jobs::{JobScheduler, SchedulerError};

/// Outcome of a single drain step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStep {
    /// Nothing was queued.
    Empty,
    /// The head row was applied and deleted.
    Delivered {
        id: OutboxMessageId,
        job_id: JobId,
        kind: IntentKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// The outbox was empty when the cycle ended.
    Drained,
    /// `max_iterations` rows were delivered; more may remain.
    BudgetExhausted,
    /// Another drain on this drainer was already running.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub delivered: usize,
    pub status: DrainStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("outbox message {id} could not be decoded: {source}")]
    Decode {
        id: OutboxMessageId,
        #[source]
        source: CodecError,
    },

    #[error("outbox message {id} for job {job_id} was not accepted by the scheduler: {source}")]
    Dispatch {
        id: OutboxMessageId,
        job_id: JobId,
        #[source]
        source: SchedulerError,
    },

    #[error(transparent)]
    Store(#[from] OutboxStoreError),
}

impl DrainError {
    /// Whether the next cycle may succeed without anyone touching the row.
    pub fn is_retryable(&self) -> bool {
        match self {
            DrainError::Decode { .. } => false,
            DrainError::Dispatch { source, .. } => source.is_retryable(),
            DrainError::Store(err) => matches!(err, OutboxStoreError::Unavailable { .. }),
        }
    }

    /// The blocking row, when the failure is tied to one.
    pub fn message_id(&self) -> Option<OutboxMessageId> {
        match self {
            DrainError::Decode { id, .. } | DrainError::Dispatch { id, .. } => Some(*id),
            DrainError::Store(_) => None,
        }
    }
}

/// Moves intents from an [`OutboxStore`] into a [`JobScheduler`].
///
/// Overlapping `drain` calls on the same drainer are single-flight; running
/// several drainers against one store is not supported.
pub struct OutboxDrainer<S, J> {
    store: S,
    scheduler: J,
    config: DrainerConfig,
    gate: Mutex<()>,
    monitor: StuckHeadMonitor,
}

impl<S, J> OutboxDrainer<S, J> {
    /// Zero limits in `config` are raised to their minimum; use
    /// [`DrainerConfig::validate`] to reject them instead.
    pub fn new(store: S, scheduler: J, config: DrainerConfig) -> Self {
        let config = config.clamped();
        let monitor = StuckHeadMonitor::new(config.stuck_alert_threshold);
        Self {
            store,
            scheduler,
            config,
            gate: Mutex::new(()),
            monitor,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn scheduler(&self) -> &J {
        &self.scheduler
    }

    pub fn config(&self) -> &DrainerConfig {
        &self.config
    }

    /// The head row that has been failing, if any.
    pub fn stuck_head(&self) -> Option<StuckHead> {
        self.monitor.current()
    }
}

impl<S, J> OutboxDrainer<S, J>
where
    S: OutboxStore,
    J: JobScheduler,
{
    /// Deliver up to `max_iterations` rows, oldest first.
    ///
    /// Stops at the first failure; rows delivered before it stay delivered.
    #[instrument(skip(self), level = "debug")]
    pub async fn drain(&self) -> Result<DrainSummary, DrainError> {
        let Ok(_gate) = self.gate.try_lock() else {
            debug!("drain already in progress; skipping");
            return Ok(DrainSummary {
                delivered: 0,
                status: DrainStatus::Skipped,
            });
        };

        let mut delivered = 0;
        while delivered < self.config.max_iterations {
            match self.step().await? {
                DrainStep::Empty => {
                    return Ok(DrainSummary {
                        delivered,
                        status: DrainStatus::Drained,
                    });
                }
                DrainStep::Delivered { .. } => delivered += 1,
            }
        }

        debug!(delivered, "drain budget exhausted");
        Ok(DrainSummary {
            delivered,
            status: DrainStatus::BudgetExhausted,
        })
    }

    /// Deliver the head row, if any. Waits for a running `drain` to finish.
    pub async fn drain_one(&self) -> Result<DrainStep, DrainError> {
        let _gate = self.gate.lock().await;
        self.step().await
    }

    async fn step(&self) -> Result<DrainStep, DrainError> {
        let Some(message) = self.store.peek_oldest().await? else {
            self.monitor.clear();
            return Ok(DrainStep::Empty);
        };

        let id = message.id();
        match self.deliver(&message).await {
            Ok(step) => {
                // The head moved on, whether the stuck row was delivered or removed.
                self.monitor.clear();
                Ok(step)
            }
            Err(err) => {
                self.monitor.record_failure(id, &err.to_string());
                Err(err)
            }
        }
    }

    async fn deliver(&self, message: &OutboxMessage) -> Result<DrainStep, DrainError> {
        let id = message.id();
        let intent = outpost_intents::decode_message(message)
            .map_err(|source| DrainError::Decode { id, source })?;

        self.dispatch(id, &intent).await?;
        self.store.delete(id).await?;

        info!(
            message_id = %id,
            job_id = %intent.job_id(),
            kind = %intent.kind(),
            "scheduling intent delivered"
        );
        Ok(DrainStep::Delivered {
            id,
            job_id: intent.job_id().clone(),
            kind: intent.kind(),
        })
    }

    async fn dispatch(&self, id: OutboxMessageId, intent: &Intent) -> Result<(), DrainError> {
        let timeout = self.config.dispatch_timeout();
        let job_id = intent.job_id();

        let registration = match intent {
            Intent::Start(start) => {
                let payload = start.payload().map_err(|e| DrainError::Decode {
                    id,
                    source: CodecError::Serialize(e),
                })?;
                Some((start.fire_time, payload))
            }
            Intent::Cancel(_) => None,
        };

        let call = async {
            match &registration {
                Some((fire_time, payload)) => {
                    self.scheduler
                        .schedule_one_time(job_id, *fire_time, payload)
                        .await
                }
                None => self.scheduler.cancel(job_id).await,
            }
        };

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SchedulerError::Timeout(timeout)),
        };

        result.map_err(|source| DrainError::Dispatch {
            id,
            job_id: job_id.clone(),
            source,
        })
    }
}
