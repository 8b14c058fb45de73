//! Pipeline configuration.
use quote_common::{Result, StreamError};
use std::time::Duration;

use crate::reconciler::Strictness;

/// Polling cadence used when none is configured.
pub const DEFAULT_INTERVAL_MS: u64 = 100;

/// Settings for one pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Time between polling ticks.
    pub interval: Duration,
    /// Handling of records with unreadable timestamps.
    pub strictness: Strictness,
}

impl StreamConfig {
    /// Builds a config, rejecting a zero interval.
    pub fn new(interval: Duration, strictness: Strictness) -> Result<Self> {
        if interval.is_zero() {
            return Err(StreamError::Format(String::from(
                "polling interval must be greater than zero",
            )));
        }
        Ok(Self {
            interval,
            strictness,
        })
    }

    /// Same as [`Self::new`] with the interval given in milliseconds.
    pub fn from_millis(interval_ms: u64, strictness: Strictness) -> Result<Self> {
        Self::new(Duration::from_millis(interval_ms), strictness)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            strictness: Strictness::default(),
        }
    }
}
