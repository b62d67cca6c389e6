use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use outpost_core::OutboxMessageId;
use outpost_intents::{NewOutboxMessage, OutboxMessage};

/// Outbox store operation error.
///
/// A failed `append` must fail the caller's business transaction; a failed
/// `peek_oldest`/`delete` aborts the current drain cycle and loses nothing.
#[derive(Debug, Error)]
pub enum OutboxStoreError {
    #[error("database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    #[error("outbox store unavailable in {operation}: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },

    #[error("outbox lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

/// Durable, append-only queue of encoded intents.
///
/// ## Semantics
///
/// - `append` joins the caller's open transaction (`Tx`) and has no transaction
///   management of its own. The row exists iff that transaction commits.
/// - `peek_oldest` returns the committed row with the smallest id.
/// - `delete` is idempotent: removing an absent id is not an error.
///
/// Producers only append; the drainer only peeks and deletes. The store's
/// commit is the sole ordering authority between them.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Transaction handle owned by the caller.
    type Tx: Send;

    async fn append(
        &self,
        tx: &mut Self::Tx,
        message: NewOutboxMessage,
    ) -> Result<OutboxMessageId, OutboxStoreError>;

    async fn peek_oldest(&self) -> Result<Option<OutboxMessage>, OutboxStoreError>;

    async fn delete(&self, id: OutboxMessageId) -> Result<(), OutboxStoreError>;
}

#[async_trait]
impl<S> OutboxStore for Arc<S>
where
    S: OutboxStore + ?Sized,
{
    type Tx = S::Tx;

    async fn append(
        &self,
        tx: &mut Self::Tx,
        message: NewOutboxMessage,
    ) -> Result<OutboxMessageId, OutboxStoreError> {
        (**self).append(tx, message).await
    }

    async fn peek_oldest(&self) -> Result<Option<OutboxMessage>, OutboxStoreError> {
        (**self).peek_oldest().await
    }

    async fn delete(&self, id: OutboxMessageId) -> Result<(), OutboxStoreError> {
        (**self).delete(id).await
    }
}
