//! `outpost-core`: identifiers and context shared by every outpost crate.
//!
//! This crate contains **pure** primitives (no IO, no storage assumptions).

pub mod context;
pub mod error;
pub mod id;

pub use context::CorrelationContext;
pub use error::DomainError;
pub use id::{CorrelationId, EntityId, JobId, JobKind, OutboxMessageId};
