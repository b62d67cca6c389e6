//! Intent codec: `Intent` <-> `(type, data)` outbox pair.
//!
//! ## Wire format
//!
//! | Intent | `type` | `data` |
//! |--------|--------|--------|
//! | Start  | `TransmissionStartOutboxMessage` | `{"JobId":..,"Time":..,"JobData":{..}}` |
//! | Cancel | `TransmissionCancelOutboxMessage` | `{"JobId":..}` |
//!
//! `data` is JSON with PascalCase field names and RFC 3339 timestamps. Unknown
//! fields are ignored so a newer writer does not wedge an older drainer during
//! a rolling deploy; missing fields are decode errors. Rows written by earlier
//! releases of the transmission service use the same format.

use thiserror::Error;

use crate::intent::{CancelIntent, Intent, StartIntent};
use crate::message::{NewOutboxMessage, OutboxMessage};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown outbox message type: {0}")]
    UnknownType(String),

    #[error("could not deserialize {message_type}: {source}")]
    Malformed {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {message_type}: {reason}")]
    Invalid {
        message_type: String,
        reason: String,
    },

    #[error("could not serialize intent: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Encode an intent into an outbox row.
pub fn encode(intent: &Intent) -> Result<NewOutboxMessage, CodecError> {
    let data = match intent {
        Intent::Start(start) => serde_json::to_string(start),
        Intent::Cancel(cancel) => serde_json::to_string(cancel),
    }
    .map_err(CodecError::Serialize)?;

    Ok(NewOutboxMessage::new(intent.message_type(), data))
}

/// Decode an outbox `(type, data)` pair.
pub fn decode(message_type: &str, data: &str) -> Result<Intent, CodecError> {
    let intent = match message_type {
        StartIntent::MESSAGE_TYPE => Intent::Start(parse::<StartIntent>(message_type, data)?),
        CancelIntent::MESSAGE_TYPE => Intent::Cancel(parse::<CancelIntent>(message_type, data)?),
        other => return Err(CodecError::UnknownType(other.to_string())),
    };

    if intent.job_id().as_str().trim().is_empty() {
        return Err(CodecError::Invalid {
            message_type: message_type.to_string(),
            reason: "empty job id".to_string(),
        });
    }

    Ok(intent)
}

/// Decode a stored outbox row.
pub fn decode_message(message: &OutboxMessage) -> Result<Intent, CodecError> {
    decode(message.message_type(), message.data())
}

fn parse<T: serde::de::DeserializeOwned>(message_type: &str, data: &str) -> Result<T, CodecError> {
    serde_json::from_str(data).map_err(|source| CodecError::Malformed {
        message_type: message_type.to_string(),
        source,
    })
}
