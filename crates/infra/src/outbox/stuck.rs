//! Tracks a head row that keeps failing.

use std::sync::{Mutex, PoisonError};

use tracing::{error, warn};

use outpost_core::OutboxMessageId;

/// The row currently blocking the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckHead {
    pub message_id: OutboxMessageId,
    /// Consecutive drain cycles that failed on this row
    pub failed_cycles: u32,
}

#[derive(Debug)]
pub(crate) struct StuckHeadMonitor {
    threshold: u32,
    current: Mutex<Option<StuckHead>>,
}

impl StuckHeadMonitor {
    pub(crate) fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            current: Mutex::new(None),
        }
    }

    /// Count a failed cycle on `message_id`; alerts every `threshold` cycles.
    pub(crate) fn record_failure(&self, message_id: OutboxMessageId, reason: &str) -> StuckHead {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        let head = match *current {
            Some(head) if head.message_id == message_id => StuckHead {
                message_id,
                failed_cycles: head.failed_cycles.saturating_add(1),
            },
            _ => StuckHead {
                message_id,
                failed_cycles: 1,
            },
        };
        *current = Some(head);

        warn!(
            message_id = %message_id,
            failed_cycles = head.failed_cycles,
            error = %reason,
            "outbox head row failed; queue blocked behind it"
        );
        if head.failed_cycles % self.threshold == 0 {
            error!(
                target: "outpost::stuck_head",
                message_id = %message_id,
                failed_cycles = head.failed_cycles,
                error = %reason,
                "outbox head row is stuck; needs manual fix or removal"
            );
        }

        head
    }

    /// Forget the tracked row once the head has moved past it.
    pub(crate) fn clear(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn current(&self) -> Option<StuckHead> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
