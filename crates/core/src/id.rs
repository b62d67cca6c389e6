//! Strongly-typed identifiers used across outpost.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of the domain entity a job is scheduled for (e.g. a transmission).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

/// Identifier of an outbox row.
///
/// Assigned by the store on append; ordering of ids is the delivery order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxMessageId(i64);

macro_rules! impl_i64_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = i64::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }
        }
    };
}

impl_i64_newtype!(EntityId, "EntityId");
impl_i64_newtype!(OutboxMessageId, "OutboxMessageId");

/// Kind of one-time job, used as the job key prefix.
///
/// This is a closed set: each prefix is a fixed identifier without a trailing
/// `-<digits>` segment, so `prefix-entity_id` can never collide across kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Starts an in-app message transmission at its scheduled time.
    TransmissionStarted,
}

impl JobKind {
    pub const ALL: [JobKind; 1] = [JobKind::TransmissionStarted];

    /// Key prefix. Changing it orphans every job already registered with the scheduler.
    pub const fn prefix(&self) -> &'static str {
        match self {
            JobKind::TransmissionStarted => "InappMessageTransmissionStartedJob",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Scheduler job key.
///
/// Doubles as the correlation key between a `Start` and a later `Cancel` for
/// the same entity, so it must be derived the same way on every process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the stable key for `kind` + `entity_id`.
    pub fn derive(kind: JobKind, entity_id: EntityId) -> Self {
        Self(format!("{}-{}", kind.prefix(), entity_id))
    }

    /// Wrap a raw key as received from the wire or a scheduler.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a derived key back into its kind and entity id.
    ///
    /// Returns `None` for keys not produced by [`JobId::derive`].
    pub fn decompose(&self) -> Option<(JobKind, EntityId)> {
        let (prefix, entity) = self.0.rsplit_once('-')?;
        // A negative entity id leaves a trailing '-' on the prefix.
        let (prefix, entity) = match prefix.strip_suffix('-') {
            Some(p) => (p, format!("-{entity}")),
            None => (prefix, entity.to_string()),
        };
        let kind = JobKind::from_prefix(prefix)?;
        let entity_id = entity.parse().ok()?;
        Some((kind, entity_id))
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DomainError::invalid_id("JobId: empty key"));
        }
        Ok(Self(s.to_string()))
    }
}

/// Identifier joining log lines across the gap between enqueue and execution.
///
/// Kept as an opaque string: upstream callers may propagate ids that are not UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh correlation id (UUIDv7, time-ordered).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}
