//! Job scheduler boundary.
//!
//! ## Design
//!
//! - One-time jobs are keyed by [`JobId`](outpost_core::JobId); registering and
//!   cancelling are idempotent with respect to that key
//! - Cancelling an unknown key is a no-op, because a Cancel may be applied
//!   before its Start reached the scheduler or after the job already fired
//! - Executions of the same key never overlap
//! - Handlers swallow downstream failures; retries are the downstream's concern
//!
//! ## Components
//!
//! - `JobScheduler`: adapter over the external time-based scheduler
//! - `LocalJobScheduler`: in-process scheduler for tests/dev, fired by explicit ticks
//! - `TransmissionStartedJob`: handler run when a transmission start fires

pub mod handler;
pub mod local;
pub mod scheduler;
pub mod types;

pub use handler::{TransmissionStartAction, TransmissionStartedJob};
pub use local::LocalJobScheduler;
pub use scheduler::{JobScheduler, ScheduledJobHandler, SchedulerError};
pub use types::{JobExecution, ScheduledJob};
