//! Handler for fired transmission-start jobs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, Instrument};

use outpost_core::{CorrelationContext, EntityId};
use outpost_intents::TransmissionJobData;

use super::scheduler::ScheduledJobHandler;
use super::types::JobExecution;

/// Downstream business action run when a transmission's start time arrives.
#[async_trait]
pub trait TransmissionStartAction: Send + Sync {
    async fn on_transmission_started(
        &self,
        ctx: &CorrelationContext,
        transmission_id: EntityId,
        start_time: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl<A> TransmissionStartAction for Arc<A>
where
    A: TransmissionStartAction + ?Sized,
{
    async fn on_transmission_started(
        &self,
        ctx: &CorrelationContext,
        transmission_id: EntityId,
        start_time: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        (**self)
            .on_transmission_started(ctx, transmission_id, start_time)
            .await
    }
}

/// Scheduled job that rebuilds the correlation context from the payload and
/// invokes the [`TransmissionStartAction`].
///
/// Failures are logged and swallowed: the job counts as complete either way.
pub struct TransmissionStartedJob<A> {
    action: A,
    caller: String,
}

impl<A> TransmissionStartedJob<A> {
    pub fn new(action: A) -> Self {
        Self {
            action,
            caller: "TransmissionStartedJob".to_string(),
        }
    }

    /// Caller name recorded on the rebuilt context.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = caller.into();
        self
    }

    pub fn action(&self) -> &A {
        &self.action
    }
}

#[async_trait]
impl<A: TransmissionStartAction> ScheduledJobHandler for TransmissionStartedJob<A> {
    async fn execute(&self, execution: &JobExecution) {
        let data: TransmissionJobData = match execution.payload.decode() {
            Ok(data) => data,
            Err(err) => {
                error!(
                    job_id = %execution.job_id,
                    error = %err,
                    "could not deserialize data for job"
                );
                return;
            }
        };

        let ctx = CorrelationContext::new(data.correlation_id).with_caller(self.caller.clone());
        let span = outpost_observability::correlation_span(&ctx, &execution.job_id);

        async {
            debug!(
                transmission_id = %data.transmission_id,
                start_time = %data.transmission_start_time,
                "transmission start job fired"
            );

            if let Err(err) = self
                .action
                .on_transmission_started(&ctx, data.transmission_id, data.transmission_start_time)
                .await
            {
                error!(
                    transmission_id = %data.transmission_id,
                    error = %format!("{err:#}"),
                    "transmission start action failed"
                );
            }
        }
        .instrument(span)
        .await
    }
}
