use std::time::Duration;

use crate::error::TRANSIENT_STATUS_CODES;

/// Methods safe to replay after a response was lost.
pub const IDEMPOTENT_METHODS: [&str; 6] = ["GET", "HEAD", "PUT", "DELETE", "OPTIONS", "TRACE"];

/// Retry configuration with exponential backoff.
///
/// Delay before retry `n` (1-indexed) is `backoff_factor * 2^(n-1)`,
/// capped at `backoff_max`. With the defaults: 0.3s, 0.6s, 1.2s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub backoff_max: Duration,
    /// Response statuses that trigger a retry.
    pub status_forcelist: Vec<u16>,
    /// Methods retried on a forcelisted status or a failure after the
    /// request was sent. Connection failures are retried for any method.
    pub allowed_methods: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_millis(300),
            backoff_max: Duration::from_secs(120),
            status_forcelist: TRANSIENT_STATUS_CODES.to_vec(),
            allowed_methods: IDEMPOTENT_METHODS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff_factor(mut self, factor: Duration) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.status_forcelist.contains(&status)
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Delay to wait before retry number `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(31);
        let delay = self.backoff_factor.saturating_mul(1u32 << exponent);
        std::cmp::min(delay, self.backoff_max)
    }
}
