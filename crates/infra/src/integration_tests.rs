//! Integration tests for the scheduling outbox pipeline.
//!
//! Tests: Publisher → OutboxStore → Drainer → JobScheduler → Job handler
//!
//! Verifies:
//! - Intents reach the scheduler in commit order, each exactly once per drain
//! - Failing rows block the queue and are never lost
//! - Rolled-back business transactions leave nothing behind
//! - Fired jobs rejoin the scheduling request's correlation id

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    use outpost_core::{CorrelationContext, CorrelationId, EntityId, JobId, JobKind};
    use outpost_intents::{
        CancelIntent, CodecError, Intent, JobPayload, NewOutboxMessage, StartIntent,
        TransmissionJobData,
    };

    use crate::config::DrainerConfig;
    use crate::jobs::{
        JobScheduler, LocalJobScheduler, SchedulerError, TransmissionStartedJob,
    };
    use crate::outbox::{
        DrainError, DrainStatus, DrainSummary, InMemoryOutboxStore, OutboxDrainer, OutboxStore,
        OutboxStoreError, PublishError, SchedulingPublisher,
    };
    use crate::testing::{FailingOutboxStore, RecordingAction, RecordingScheduler, SchedulerCall};

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn start_intent(job_id: &str, fire_time: DateTime<Utc>) -> StartIntent {
        StartIntent {
            job_id: JobId::from_raw(job_id),
            fire_time,
            job_data: TransmissionJobData {
                correlation_id: CorrelationId::new("corr-1"),
                transmission_id: EntityId::new(1),
                transmission_start_time: fire_time,
            },
        }
    }

    async fn commit_intent(store: &InMemoryOutboxStore, intent: Intent) {
        let mut tx = store.begin();
        store
            .append(&mut tx, outpost_intents::encode(&intent).unwrap())
            .await
            .unwrap();
        tx.commit().unwrap();
    }

    async fn commit_raw(store: &InMemoryOutboxStore, message_type: &str, data: &str) {
        let mut tx = store.begin();
        store
            .append(&mut tx, NewOutboxMessage::new(message_type, data))
            .await
            .unwrap();
        tx.commit().unwrap();
    }

    fn recording_drainer(
        store: &InMemoryOutboxStore,
    ) -> (Arc<RecordingScheduler>, OutboxDrainer<InMemoryOutboxStore, Arc<RecordingScheduler>>) {
        let scheduler = Arc::new(RecordingScheduler::new());
        let drainer = OutboxDrainer::new(store.clone(), scheduler.clone(), DrainerConfig::default());
        (scheduler, drainer)
    }

    #[tokio::test]
    async fn empty_outbox_makes_no_scheduler_calls() {
        let store = InMemoryOutboxStore::new();
        let (scheduler, drainer) = recording_drainer(&store);

        let summary = drainer.drain().await.unwrap();

        assert_eq!(summary, DrainSummary { delivered: 0, status: DrainStatus::Drained });
        assert!(scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn start_round_trip_registers_one_job_and_empties_outbox() {
        let store = InMemoryOutboxStore::new();
        let (scheduler, drainer) = recording_drainer(&store);
        let intent = start_intent("T-1", new_year());
        let expected_payload = intent.payload().unwrap();
        commit_intent(&store, intent.into()).await;

        drainer.drain().await.unwrap();

        assert_eq!(
            scheduler.calls(),
            vec![SchedulerCall::Schedule {
                job_id: JobId::from_raw("T-1"),
                fire_time: new_year(),
                payload: expected_payload,
            }]
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn cancel_without_prior_start_is_harmless() {
        let store = InMemoryOutboxStore::new();
        let drainer = OutboxDrainer::new(store.clone(), LocalJobScheduler::arc(), DrainerConfig::default());
        commit_intent(&store, CancelIntent { job_id: JobId::from_raw("T-2") }.into()).await;

        let summary = drainer.drain().await.unwrap();

        assert_eq!(summary.delivered, 1);
        assert!(store.is_empty());
        assert!(drainer.scheduler().is_empty());
    }

    #[tokio::test]
    async fn cancel_reaches_scheduler_with_its_key() {
        let store = InMemoryOutboxStore::new();
        let (scheduler, drainer) = recording_drainer(&store);
        commit_intent(&store, CancelIntent { job_id: JobId::from_raw("T-2") }.into()).await;

        drainer.drain().await.unwrap();

        assert_eq!(scheduler.calls(), vec![SchedulerCall::Cancel(JobId::from_raw("T-2"))]);
    }

    #[tokio::test]
    async fn poison_head_blocks_everything_behind_it() {
        let store = InMemoryOutboxStore::new();
        let (scheduler, drainer) = recording_drainer(&store);
        commit_raw(&store, "TransmissionStartOutboxMessage", "{ not json").await;
        commit_intent(&store, start_intent("T-3", new_year()).into()).await;

        for _ in 0..3 {
            let err = drainer.drain().await.unwrap_err();
            assert!(matches!(err, DrainError::Decode { source: CodecError::Malformed { .. }, .. }));
        }

        assert!(scheduler.calls().is_empty());
        assert_eq!(store.len(), 2);
        assert_eq!(drainer.stuck_head().unwrap().failed_cycles, 3);
    }

    #[tokio::test]
    async fn removing_the_poison_row_unblocks_the_queue() {
        let store = InMemoryOutboxStore::new();
        let (scheduler, drainer) = recording_drainer(&store);
        commit_raw(&store, "NoSuchMessage", "{}").await;
        commit_intent(&store, CancelIntent { job_id: JobId::from_raw("T-4") }.into()).await;

        let err = drainer.drain().await.unwrap_err();
        store.delete(err.message_id().unwrap()).await.unwrap();

        let summary = drainer.drain().await.unwrap();
        assert_eq!(summary.delivered, 1);
        assert_eq!(scheduler.calls(), vec![SchedulerCall::Cancel(JobId::from_raw("T-4"))]);
        assert!(drainer.stuck_head().is_none());
    }

    #[tokio::test]
    async fn removed_stuck_row_is_forgotten_when_the_next_cycle_hits_its_budget() {
        let store = InMemoryOutboxStore::new();
        let scheduler = Arc::new(RecordingScheduler::new());
        let drainer = OutboxDrainer::new(
            store.clone(),
            scheduler.clone(),
            DrainerConfig::default().with_max_iterations(2),
        );
        commit_raw(&store, "NoSuchMessage", "{}").await;
        for n in 0..5 {
            commit_intent(&store, CancelIntent { job_id: JobId::from_raw(format!("T-{n}")) }.into()).await;
        }

        let err = drainer.drain().await.unwrap_err();
        assert!(drainer.stuck_head().is_some());
        store.delete(err.message_id().unwrap()).await.unwrap();

        let summary = drainer.drain().await.unwrap();
        assert_eq!(summary, DrainSummary { delivered: 2, status: DrainStatus::BudgetExhausted });
        assert!(drainer.stuck_head().is_none());
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn publisher_surfaces_append_failures() {
        let store = FailingOutboxStore::new();
        let publisher = SchedulingPublisher::new(store.clone());
        store.fail_append(true);

        let mut tx = store.begin();
        let err = publisher
            .schedule_start(&mut tx, EntityId::new(8), new_year(), &CorrelationContext::empty())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::Store(OutboxStoreError::Unavailable { operation: "append", .. })
        ));

        let err = publisher.cancel_scheduled_start(&mut tx, EntityId::new(8)).await.unwrap_err();
        assert!(matches!(err, PublishError::Store(_)));

        assert_eq!(tx.commit().unwrap(), 0);
        assert!(store.inner().is_empty());
    }

    #[tokio::test]
    async fn peek_failure_touches_neither_row_nor_scheduler() {
        let store = FailingOutboxStore::new();
        let scheduler = Arc::new(RecordingScheduler::new());
        let drainer = OutboxDrainer::new(store.clone(), scheduler.clone(), DrainerConfig::default());
        commit_intent(store.inner(), CancelIntent { job_id: JobId::from_raw("T-10") }.into()).await;

        store.fail_peek(true);
        let err = drainer.drain().await.unwrap_err();
        assert!(matches!(
            err,
            DrainError::Store(OutboxStoreError::Unavailable { operation: "peek_oldest", .. })
        ));
        assert!(err.is_retryable());
        assert!(scheduler.calls().is_empty());
        assert_eq!(store.inner().len(), 1);

        store.fail_peek(false);
        assert_eq!(drainer.drain().await.unwrap().delivered, 1);
        assert_eq!(scheduler.calls(), vec![SchedulerCall::Cancel(JobId::from_raw("T-10"))]);
    }

    #[tokio::test]
    async fn delete_failure_keeps_the_row_and_redelivery_is_idempotent() {
        let store = FailingOutboxStore::new();
        let drainer = OutboxDrainer::new(store.clone(), LocalJobScheduler::arc(), DrainerConfig::default());
        commit_intent(store.inner(), start_intent("T-11", new_year()).into()).await;

        store.fail_delete(true);
        let err = drainer.drain().await.unwrap_err();
        assert!(matches!(
            err,
            DrainError::Store(OutboxStoreError::Unavailable { operation: "delete", .. })
        ));
        assert_eq!(store.inner().len(), 1);
        assert_eq!(drainer.scheduler().len(), 1);
        assert!(drainer.stuck_head().is_some());

        store.fail_delete(false);
        let summary = drainer.drain().await.unwrap();
        assert_eq!(summary, DrainSummary { delivered: 1, status: DrainStatus::Drained });
        assert!(store.inner().is_empty());
        assert_eq!(drainer.scheduler().len(), 1);
        assert!(drainer.stuck_head().is_none());
    }

    #[tokio::test]
    async fn conflicting_start_is_retryable_and_kept() {
        let store = InMemoryOutboxStore::new();
        let drainer = OutboxDrainer::new(store.clone(), LocalJobScheduler::arc(), DrainerConfig::default());
        let existing = start_intent("T-1", new_year());
        drainer
            .scheduler()
            .schedule_one_time(&existing.job_id, existing.fire_time, &existing.payload().unwrap())
            .await
            .unwrap();

        commit_intent(&store, start_intent("T-1", new_year() + chrono::Duration::hours(1)).into()).await;

        let err = drainer.drain().await.unwrap_err();
        assert!(matches!(
            err,
            DrainError::Dispatch { source: SchedulerError::DuplicateKey(_), .. }
        ));
        assert!(err.is_retryable());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn identical_redelivery_after_crash_is_idempotent() {
        let store = InMemoryOutboxStore::new();
        let drainer = OutboxDrainer::new(store.clone(), LocalJobScheduler::arc(), DrainerConfig::default());
        let intent = start_intent("T-1", new_year());
        // Scheduler accepted it, but the row was never deleted.
        drainer
            .scheduler()
            .schedule_one_time(&intent.job_id, intent.fire_time, &intent.payload().unwrap())
            .await
            .unwrap();
        commit_intent(&store, intent.into()).await;

        let summary = drainer.drain().await.unwrap();

        assert_eq!(summary.delivered, 1);
        assert!(store.is_empty());
        assert_eq!(drainer.scheduler().len(), 1);
    }

    #[tokio::test]
    async fn rolled_back_transaction_leaves_no_row() {
        let store = InMemoryOutboxStore::new();
        let publisher = SchedulingPublisher::new(store.clone());

        let mut tx = store.begin();
        publisher
            .schedule_start(&mut tx, EntityId::new(5), new_year(), &CorrelationContext::empty())
            .await
            .unwrap();
        tx.rollback();

        assert!(store.is_empty());
        assert!(store.peek_oldest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scheduler_outage_keeps_the_row_until_it_recovers() {
        let store = InMemoryOutboxStore::new();
        let (scheduler, drainer) = recording_drainer(&store);
        commit_intent(&store, CancelIntent { job_id: JobId::from_raw("T-6") }.into()).await;

        scheduler.set_failure(Some(SchedulerError::Unavailable("connection refused".into())));
        let err = drainer.drain().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.len(), 1);

        scheduler.set_failure(None);
        assert_eq!(drainer.drain().await.unwrap().delivered, 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_timeout_keeps_the_row() {
        let store = InMemoryOutboxStore::new();
        let scheduler = Arc::new(RecordingScheduler::new());
        scheduler.set_delay(Some(Duration::from_secs(10)));
        let drainer = OutboxDrainer::new(
            store.clone(),
            scheduler.clone(),
            DrainerConfig::default().with_dispatch_timeout(Duration::from_secs(1)),
        );
        commit_intent(&store, CancelIntent { job_id: JobId::from_raw("T-7") }.into()).await;

        let err = drainer.drain().await.unwrap_err();

        assert!(matches!(
            err,
            DrainError::Dispatch { source: SchedulerError::Timeout(t), .. } if t == Duration::from_secs(1)
        ));
        assert!(err.is_retryable());
        assert_eq!(store.len(), 1);
        assert!(scheduler.calls().is_empty());
    }

    #[tokio::test]
    async fn fired_job_runs_action_with_the_requests_correlation_id() {
        let store = InMemoryOutboxStore::new();
        let publisher = SchedulingPublisher::new(store.clone());
        let scheduler = LocalJobScheduler::arc();
        let action = Arc::new(RecordingAction::default());
        scheduler.register_handler(
            JobKind::TransmissionStarted.prefix(),
            Arc::new(TransmissionStartedJob::new(action.clone())),
        );
        let drainer = OutboxDrainer::new(store.clone(), scheduler.clone(), DrainerConfig::default());

        let ctx = CorrelationContext::new(CorrelationId::new("req-77"));
        let mut tx = store.begin();
        publisher
            .schedule_start(&mut tx, EntityId::new(77), new_year(), &ctx)
            .await
            .unwrap();
        tx.commit().unwrap();

        drainer.drain().await.unwrap();
        assert_eq!(scheduler.fire_due(new_year()).await, 1);

        let started = action.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].correlation_id.as_deref(), Some("req-77"));
        assert_eq!(started[0].transmission_id, EntityId::new(77));
        assert_eq!(started[0].start_time, new_year());
    }

    #[tokio::test]
    async fn start_then_cancel_in_one_transaction_never_fires() {
        let store = InMemoryOutboxStore::new();
        let publisher = SchedulingPublisher::new(store.clone());
        let scheduler = LocalJobScheduler::arc();
        let action = Arc::new(RecordingAction::default());
        scheduler.register_handler(
            JobKind::TransmissionStarted.prefix(),
            Arc::new(TransmissionStartedJob::new(action.clone())),
        );
        let drainer = OutboxDrainer::new(store.clone(), scheduler.clone(), DrainerConfig::default());

        let mut tx = store.begin();
        publisher
            .schedule_start(&mut tx, EntityId::new(8), new_year(), &CorrelationContext::empty())
            .await
            .unwrap();
        publisher.cancel_scheduled_start(&mut tx, EntityId::new(8)).await.unwrap();
        tx.commit().unwrap();

        assert_eq!(drainer.drain().await.unwrap().delivered, 2);
        assert_eq!(scheduler.fire_due(new_year()).await, 0);
        assert!(action.started().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start { entity: i64, hour: u32 },
        Cancel { entity: i64 },
    }

    fn op() -> impl Strategy<Value = (Op, bool)> {
        let op = prop_oneof![
            (0i64..4, 0u32..24).prop_map(|(entity, hour)| Op::Start { entity, hour }),
            (0i64..4).prop_map(|entity| Op::Cancel { entity }),
        ];
        (op, any::<bool>())
    }

    proptest! {
        #[test]
        fn committed_intents_reach_the_scheduler_in_commit_order(
            ops in prop::collection::vec(op(), 0..40),
            budget in 1usize..8,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let store = InMemoryOutboxStore::new();
                let publisher = SchedulingPublisher::new(store.clone());
                let scheduler = Arc::new(RecordingScheduler::new());
                let drainer = OutboxDrainer::new(
                    store.clone(),
                    scheduler.clone(),
                    DrainerConfig::default().with_max_iterations(budget),
                );
                let ctx = CorrelationContext::new(CorrelationId::new("prop"));

                let mut expected = Vec::new();
                for (op, commit) in &ops {
                    let mut tx = store.begin();
                    let call = match *op {
                        Op::Start { entity, hour } => {
                            let at = new_year() + chrono::Duration::hours(hour as i64);
                            publisher
                                .schedule_start(&mut tx, EntityId::new(entity), at, &ctx)
                                .await
                                .unwrap();
                            (JobId::derive(JobKind::TransmissionStarted, EntityId::new(entity)), Some(at))
                        }
                        Op::Cancel { entity } => {
                            publisher
                                .cancel_scheduled_start(&mut tx, EntityId::new(entity))
                                .await
                                .unwrap();
                            (JobId::derive(JobKind::TransmissionStarted, EntityId::new(entity)), None)
                        }
                    };
                    if *commit {
                        tx.commit().unwrap();
                        expected.push(call);
                    } else {
                        tx.rollback();
                    }
                }

                loop {
                    let summary = drainer.drain().await.unwrap();
                    if summary.status == DrainStatus::Drained {
                        break;
                    }
                    prop_assert_eq!(summary.delivered, budget);
                }

                let actual: Vec<(JobId, Option<DateTime<Utc>>)> = scheduler
                    .calls()
                    .into_iter()
                    .map(|call| match call {
                        SchedulerCall::Schedule { job_id, fire_time, .. } => (job_id, Some(fire_time)),
                        SchedulerCall::Cancel(job_id) => (job_id, None),
                        SchedulerCall::DeleteAll => unreachable!("drainer never deletes all jobs"),
                    })
                    .collect();

                prop_assert_eq!(actual, expected);
                prop_assert!(store.is_empty());
                Ok(())
            })?;
        }
    }

    #[test]
    fn payload_handed_to_scheduler_is_the_job_data() {
        let intent = start_intent("T-1", new_year());
        let payload: JobPayload = intent.payload().unwrap();
        let data: TransmissionJobData = payload.decode().unwrap();
        assert_eq!(data, intent.job_data);
    }
}
