use serde::{Deserialize, Serialize};

use outpost_core::OutboxMessageId;

/// An outbox row that has not been appended yet (no id assigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOutboxMessage {
    pub message_type: String,
    pub data: String,
}

impl NewOutboxMessage {
    pub fn new(message_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            data: data.into(),
        }
    }
}

/// A persisted outbox row.
///
/// Notes:
/// - **Append-only**: rows are appended or deleted, never updated.
/// - `id` is assigned by the store and is the sole ordering guarantee.
/// - `data` is opaque here; only the codec interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    id: OutboxMessageId,
    message_type: String,
    data: String,
}

impl OutboxMessage {
    pub fn new(id: OutboxMessageId, message_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id,
            message_type: message_type.into(),
            data: data.into(),
        }
    }

    pub fn from_new(id: OutboxMessageId, message: NewOutboxMessage) -> Self {
        Self {
            id,
            message_type: message.message_type,
            data: message.data,
        }
    }

    pub fn id(&self) -> OutboxMessageId {
        self.id
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}
