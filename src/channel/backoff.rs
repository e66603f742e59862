//! Reconnection backoff.

use serde::Deserialize;
use std::time::Duration;

/// Exponential backoff between reconnection attempts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    /// Default: 1s
    #[serde(rename = "initial_ms", with = "crate::config::duration_ms")]
    pub initial: Duration,

    /// Upper bound for any single delay.
    /// Default: 30s
    #[serde(rename = "max_ms", with = "crate::config::duration_ms")]
    pub max: Duration,

    /// Growth factor per consecutive failure.
    /// Default: 2
    pub multiplier: u32,

    /// Consecutive failed attempts before giving up (None = retry forever).
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Whether `failures` consecutive failures exhaust the retry ceiling.
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}
