//! Transactional outbox for scheduling intents.
//!
//! ## Flow
//!
//! 1. A business transaction calls [`SchedulingPublisher`], which appends an
//!    encoded intent to the [`OutboxStore`] **inside the caller's transaction**.
//! 2. A periodic trigger runs the [`OutboxDrainer`], which takes the oldest row,
//!    decodes it, applies it to the job scheduler, and deletes it.
//!
//! The drainer never skips a row: a row that cannot be decoded or dispatched
//! stays at the head and blocks everything behind it until it is fixed or
//! removed. This keeps Start/Cancel for the same job key in commit order.

pub mod drainer;
pub mod in_memory;
pub mod postgres;
pub mod publisher;
pub mod store;
mod stuck;

pub use drainer::{DrainError, DrainStatus, DrainStep, DrainSummary, OutboxDrainer};
pub use in_memory::{InMemoryOutboxStore, InMemoryTransaction};
pub use postgres::PostgresOutboxStore;
pub use publisher::{PublishError, SchedulingPublisher};
pub use store::{OutboxStore, OutboxStoreError};
pub use stuck::StuckHead;
