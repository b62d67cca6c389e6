//! Correlation context carried explicitly from a request into scheduled work.

use serde::{Deserialize, Serialize};

use crate::id::CorrelationId;

/// Logging/correlation context of the current unit of work.
///
/// Passed by value through the publisher into the job payload, then rebuilt by
/// the job handler when the job fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationContext {
    correlation_id: Option<CorrelationId>,
    caller: Option<String>,
}

impl CorrelationContext {
    /// A context with no correlation id (one will be generated when needed).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            caller: None,
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// The current correlation id, or a freshly generated one.
    pub fn correlation_id_or_generate(&self) -> CorrelationId {
        self.correlation_id
            .clone()
            .unwrap_or_else(CorrelationId::generate)
    }
}
