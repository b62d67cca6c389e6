use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use outpost_core::{CorrelationId, EntityId, JobId};

/// Data handed to the transmission-started job when it fires.
///
/// Carries the correlation id of the request that scheduled the job so the
/// handler can rejoin its logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransmissionJobData {
    pub correlation_id: CorrelationId,
    pub transmission_id: EntityId,
    pub transmission_start_time: DateTime<Utc>,
}

/// Opaque job payload as stored by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn from_data<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(data).map(Self)
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Register a one-time job under `job_id` that fires at `fire_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartIntent {
    pub job_id: JobId,
    #[serde(rename = "Time")]
    pub fire_time: DateTime<Utc>,
    pub job_data: TransmissionJobData,
}

impl StartIntent {
    pub const MESSAGE_TYPE: &'static str = "TransmissionStartOutboxMessage";

    pub fn payload(&self) -> Result<JobPayload, serde_json::Error> {
        JobPayload::from_data(&self.job_data)
    }
}

/// Remove the job registered under `job_id`, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancelIntent {
    pub job_id: JobId,
}

impl CancelIntent {
    pub const MESSAGE_TYPE: &'static str = "TransmissionCancelOutboxMessage";
}

/// A decoded outbox intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Start(StartIntent),
    Cancel(CancelIntent),
}

/// Variant discriminator, handy for logs and drain reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Start,
    Cancel,
}

impl core::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IntentKind::Start => f.write_str("start"),
            IntentKind::Cancel => f.write_str("cancel"),
        }
    }
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::Start(_) => IntentKind::Start,
            Intent::Cancel(_) => IntentKind::Cancel,
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Intent::Start(_) => StartIntent::MESSAGE_TYPE,
            Intent::Cancel(_) => CancelIntent::MESSAGE_TYPE,
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Intent::Start(s) => &s.job_id,
            Intent::Cancel(c) => &c.job_id,
        }
    }
}

impl From<StartIntent> for Intent {
    fn from(value: StartIntent) -> Self {
        Intent::Start(value)
    }
}

impl From<CancelIntent> for Intent {
    fn from(value: CancelIntent) -> Self {
        Intent::Cancel(value)
    }
}
