//! Background workers.

pub mod drain_worker;

pub use drain_worker::{DrainWorker, DrainWorkerHandle, DrainWorkerStats};
