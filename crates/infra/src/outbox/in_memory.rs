use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use outpost_core::OutboxMessageId;
use outpost_intents::{NewOutboxMessage, OutboxMessage};

use super::store::{OutboxStore, OutboxStoreError};

#[derive(Debug, Default)]
struct Shared {
    /// Last reserved id. Ids are reserved on append, like a database sequence,
    /// so rolled-back appends leave gaps.
    last_id: AtomicI64,
    rows: RwLock<BTreeMap<OutboxMessageId, OutboxMessage>>,
}

/// In-memory outbox store.
///
/// Intended for tests/dev. Cloning shares the same underlying queue.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOutboxStore {
    shared: Arc<Shared>,
}

/// Transaction handle for [`InMemoryOutboxStore`].
///
/// Appended rows become visible on [`commit`](Self::commit). Dropping the
/// handle without committing rolls back.
#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    staged: Vec<OutboxMessage>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction for a unit of business work.
    pub fn begin(&self) -> InMemoryTransaction {
        InMemoryTransaction {
            shared: self.shared.clone(),
            staged: Vec::new(),
        }
    }

    /// Committed rows in id order.
    pub fn messages(&self) -> Vec<OutboxMessage> {
        let rows = self.shared.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shared
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InMemoryTransaction {
    /// Number of rows appended in this transaction so far.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Make all appended rows visible atomically. Returns how many were committed.
    pub fn commit(self) -> Result<usize, OutboxStoreError> {
        let mut rows = self
            .shared
            .rows
            .write()
            .map_err(|_| OutboxStoreError::LockPoisoned("outbox rows"))?;

        let count = self.staged.len();
        for message in self.staged {
            rows.insert(message.id(), message);
        }
        Ok(count)
    }

    /// Discard all appended rows.
    pub fn rollback(self) {}
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    type Tx = InMemoryTransaction;

    async fn append(
        &self,
        tx: &mut InMemoryTransaction,
        message: NewOutboxMessage,
    ) -> Result<OutboxMessageId, OutboxStoreError> {
        let id = OutboxMessageId::new(tx.shared.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        tx.staged.push(OutboxMessage::from_new(id, message));
        Ok(id)
    }

    async fn peek_oldest(&self) -> Result<Option<OutboxMessage>, OutboxStoreError> {
        let rows = self
            .shared
            .rows
            .read()
            .map_err(|_| OutboxStoreError::LockPoisoned("outbox rows"))?;
        Ok(rows.values().next().cloned())
    }

    async fn delete(&self, id: OutboxMessageId) -> Result<(), OutboxStoreError> {
        let mut rows = self
            .shared
            .rows
            .write()
            .map_err(|_| OutboxStoreError::LockPoisoned("outbox rows"))?;
        rows.remove(&id);
        Ok(())
    }
}
