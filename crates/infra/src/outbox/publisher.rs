use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use outpost_core::{CorrelationContext, EntityId, JobId, JobKind, OutboxMessageId};
use outpost_intents::{CancelIntent, CodecError, Intent, StartIntent, TransmissionJobData};

use super::store::{OutboxStore, OutboxStoreError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] OutboxStoreError),
}

/// Producer-side facade: turns business actions into outbox intents.
///
/// Never talks to the scheduler. Every call appends to the outbox within the
/// transaction handed in by the caller, so the intent commits or rolls back
/// together with the business change. Errors are returned as-is; the caller
/// must fail its transaction on `Err`.
#[derive(Debug, Clone)]
pub struct SchedulingPublisher<S> {
    store: S,
}

impl<S> SchedulingPublisher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: OutboxStore> SchedulingPublisher<S> {
    /// Queue "start transmission `transmission_id` at `fire_time`".
    ///
    /// The job payload carries the correlation id from `ctx`, or a new one if
    /// the context has none.
    pub async fn schedule_start(
        &self,
        tx: &mut S::Tx,
        transmission_id: EntityId,
        fire_time: DateTime<Utc>,
        ctx: &CorrelationContext,
    ) -> Result<OutboxMessageId, PublishError> {
        let intent = StartIntent {
            job_id: JobId::derive(JobKind::TransmissionStarted, transmission_id),
            fire_time,
            job_data: TransmissionJobData {
                correlation_id: ctx.correlation_id_or_generate(),
                transmission_id,
                transmission_start_time: fire_time,
            },
        };

        self.publish(tx, intent.into()).await
    }

    /// Queue "cancel the scheduled start of `transmission_id`".
    pub async fn cancel_scheduled_start(
        &self,
        tx: &mut S::Tx,
        transmission_id: EntityId,
    ) -> Result<OutboxMessageId, PublishError> {
        let intent = CancelIntent {
            job_id: JobId::derive(JobKind::TransmissionStarted, transmission_id),
        };

        self.publish(tx, intent.into()).await
    }

    async fn publish(&self, tx: &mut S::Tx, intent: Intent) -> Result<OutboxMessageId, PublishError> {
        let message = outpost_intents::encode(&intent)?;
        let id = self.store.append(tx, message).await?;

        debug!(
            message_id = %id,
            job_id = %intent.job_id(),
            kind = %intent.kind(),
            "scheduling intent appended to outbox"
        );
        Ok(id)
    }
}
