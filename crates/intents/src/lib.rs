//! Scheduling intents and their outbox representation.
//!
//! An intent is a durable record of what should eventually happen on the job
//! scheduler. It is written to the outbox as a `(type, data)` pair and decoded
//! back into [`Intent`] by the drainer.

pub mod codec;
pub mod intent;
pub mod message;

pub use codec::{decode, decode_message, encode, CodecError};
pub use intent::{CancelIntent, Intent, IntentKind, JobPayload, StartIntent, TransmissionJobData};
pub use message::{NewOutboxMessage, OutboxMessage};
