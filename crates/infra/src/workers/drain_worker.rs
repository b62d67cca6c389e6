use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::jobs::JobScheduler;
use crate::outbox::{DrainError, DrainStatus, OutboxDrainer, OutboxStore};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Drain worker runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainWorkerStats {
    pub cycles: u64,
    pub delivered: u64,
    pub failed_cycles: u64,
    pub skipped_cycles: u64,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Handle to control and join a running drain worker.
#[derive(Debug)]
pub struct DrainWorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    trigger: Arc<Notify>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<DrainWorkerStats>>,
}

impl DrainWorkerHandle {
    /// Request graceful shutdown and wait for the in-flight drain to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "drain worker task ended abnormally");
            }
        }
    }

    /// Request a drain now instead of waiting for the next tick.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn stats(&self) -> DrainWorkerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }
}

/// Periodic trigger for an [`OutboxDrainer`].
///
/// One task runs drains back to back, so a slow drain delays the next tick
/// rather than overlapping it. Drain errors are logged and counted; the loop
/// keeps running.
#[derive(Debug)]
pub struct DrainWorker;

impl DrainWorker {
    /// Spawn the worker loop on the current tokio runtime.
    pub fn spawn<S, J>(
        name: &'static str,
        drainer: Arc<OutboxDrainer<S, J>>,
        interval: Duration,
    ) -> DrainWorkerHandle
    where
        S: OutboxStore + 'static,
        J: JobScheduler + 'static,
    {
        // `tokio::time::interval` panics on a zero period.
        let interval = interval.max(MIN_INTERVAL);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let trigger = Arc::new(Notify::new());
        let stats = Arc::new(Mutex::new(DrainWorkerStats::default()));

        let join = tokio::spawn(worker_loop(
            name,
            drainer,
            interval,
            shutdown_rx,
            trigger.clone(),
            stats.clone(),
        ));

        DrainWorkerHandle {
            shutdown: Some(shutdown_tx),
            trigger,
            join: Some(join),
            stats,
        }
    }
}

async fn worker_loop<S, J>(
    name: &'static str,
    drainer: Arc<OutboxDrainer<S, J>>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
    trigger: Arc<Notify>,
    stats: Arc<Mutex<DrainWorkerStats>>,
) where
    S: OutboxStore,
    J: JobScheduler,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(worker = name, interval_ms = interval.as_millis() as u64, "drain worker started");

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
            _ = trigger.notified() => debug!(worker = name, "manual drain requested"),
        }

        let result = drainer.drain().await;
        record(name, &stats, &result);
    }

    info!(worker = name, "drain worker stopped");
}

fn record(
    name: &'static str,
    stats: &Mutex<DrainWorkerStats>,
    result: &Result<crate::outbox::DrainSummary, DrainError>,
) {
    let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
    stats.cycles += 1;
    stats.last_cycle_at = Some(Utc::now());

    match result {
        Ok(summary) => {
            stats.delivered += summary.delivered as u64;
            if summary.status == DrainStatus::Skipped {
                stats.skipped_cycles += 1;
            } else if summary.delivered > 0 {
                debug!(
                    worker = name,
                    delivered = summary.delivered,
                    status = ?summary.status,
                    "drain cycle finished"
                );
            }
        }
        Err(err) => {
            stats.failed_cycles += 1;
            stats.last_error = Some(err.to_string());
            error!(
                worker = name,
                error = %err,
                retryable = err.is_retryable(),
                message_id = ?err.message_id(),
                "error processing scheduling events"
            );
        }
    }
}
