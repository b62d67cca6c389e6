//! Infrastructure layer: outbox storage and draining, job scheduling, config.
//!
//! ## Modules
//!
//! - `outbox`: transactional outbox, publisher and drainer
//! - `jobs`: job scheduler boundary, local scheduler, transmission job handler
//! - `workers`: periodic drain trigger
//! - `config`: runtime configuration

pub mod config;
pub mod jobs;
pub mod outbox;
pub mod workers;

pub use config::{ConfigError, DrainerConfig, OutpostConfig};

#[cfg(test)]
mod testing;

mod integration_tests;
