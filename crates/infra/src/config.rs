//! Runtime configuration.
//!
//! Values come from defaults, then environment variables:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `DATABASE_URL` | `database_url` | none |
//! | `OUTPOST_DRAIN_INTERVAL_MS` | `drain.interval_ms` | 5000 |
//! | `OUTPOST_DRAIN_MAX_ITERATIONS` | `drain.max_iterations` | 100 |
//! | `OUTPOST_DISPATCH_TIMEOUT_MS` | `drain.dispatch_timeout_ms` | 30000 |
//! | `OUTPOST_STUCK_ALERT_THRESHOLD` | `drain.stuck_alert_threshold` | 3 |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Drainer tuning. Every field must be greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DrainerConfigFields")]
pub struct DrainerConfig {
    /// Period of the drain worker
    pub interval_ms: u64,
    /// Maximum rows handled by one `drain()` call
    pub max_iterations: usize,
    /// Upper bound on a single scheduler call
    pub dispatch_timeout_ms: u64,
    /// Consecutive failed cycles on one head row before alerting
    pub stuck_alert_threshold: u32,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            max_iterations: 100,
            dispatch_timeout_ms: 30_000,
            stuck_alert_threshold: 3,
        }
    }
}

/// Raw deserialized form of [`DrainerConfig`], checked before use.
#[derive(Deserialize)]
#[serde(default)]
struct DrainerConfigFields {
    interval_ms: u64,
    max_iterations: usize,
    dispatch_timeout_ms: u64,
    stuck_alert_threshold: u32,
}

impl Default for DrainerConfigFields {
    fn default() -> Self {
        let d = DrainerConfig::default();
        Self {
            interval_ms: d.interval_ms,
            max_iterations: d.max_iterations,
            dispatch_timeout_ms: d.dispatch_timeout_ms,
            stuck_alert_threshold: d.stuck_alert_threshold,
        }
    }
}

impl TryFrom<DrainerConfigFields> for DrainerConfig {
    type Error = ConfigError;

    fn try_from(fields: DrainerConfigFields) -> Result<Self, Self::Error> {
        let config = Self {
            interval_ms: fields.interval_ms,
            max_iterations: fields.max_iterations,
            dispatch_timeout_ms: fields.dispatch_timeout_ms,
            stuck_alert_threshold: fields.stuck_alert_threshold,
        };
        config.validate()?;
        Ok(config)
    }
}

impl DrainerConfig {
    /// Reject zero limits: a zero interval cannot drive a timer and a zero
    /// budget would never deliver anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("interval_ms", self.interval_ms)?;
        positive("max_iterations", self.max_iterations)?;
        positive("dispatch_timeout_ms", self.dispatch_timeout_ms)?;
        positive("stuck_alert_threshold", self.stuck_alert_threshold)?;
        Ok(())
    }

    /// Raise zero limits to 1.
    pub(crate) fn clamped(self) -> Self {
        Self {
            interval_ms: self.interval_ms.max(1),
            max_iterations: self.max_iterations.max(1),
            dispatch_timeout_ms: self.dispatch_timeout_ms.max(1),
            stuck_alert_threshold: self.stuck_alert_threshold.max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_stuck_alert_threshold(mut self, threshold: u32) -> Self {
        self.stuck_alert_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutpostConfig {
    pub database_url: Option<String>,
    pub drain: DrainerConfig,
}

impl OutpostConfig {
    /// Load from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (unset keys keep their defaults).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            config.database_url = Some(url);
        }

        if let Some(v) = parse(&lookup, "OUTPOST_DRAIN_INTERVAL_MS")? {
            config.drain.interval_ms = positive("OUTPOST_DRAIN_INTERVAL_MS", v)?;
        }
        if let Some(v) = parse(&lookup, "OUTPOST_DRAIN_MAX_ITERATIONS")? {
            config.drain.max_iterations = positive("OUTPOST_DRAIN_MAX_ITERATIONS", v)?;
        }
        if let Some(v) = parse(&lookup, "OUTPOST_DISPATCH_TIMEOUT_MS")? {
            config.drain.dispatch_timeout_ms = positive("OUTPOST_DISPATCH_TIMEOUT_MS", v)?;
        }
        if let Some(v) = parse(&lookup, "OUTPOST_STUCK_ALERT_THRESHOLD")? {
            config.drain.stuck_alert_threshold = positive("OUTPOST_STUCK_ALERT_THRESHOLD", v)?;
        }

        config.drain.validate()?;
        Ok(config)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn positive<T>(key: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }
}
