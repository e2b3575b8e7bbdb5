//! Retry policy with exponential backoff.

use std::time::Duration;

use super::error::ApiError;
use crate::config::RetryConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Retries after the first attempt
  pub max_retries: u32,
  pub base_delay: Duration,
  /// Backoff multiplier, >= 1.0 so delays never shrink
  pub multiplier: f64,
  pub max_delay: Duration,
  pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from(&RetryConfig::default())
  }
}

impl From<&RetryConfig> for RetryPolicy {
  fn from(config: &RetryConfig) -> Self {
    Self {
      max_retries: config.max_retries,
      base_delay: Duration::from_millis(config.base_delay_ms),
      multiplier: config.multiplier.max(1.0),
      max_delay: Duration::from_millis(config.max_delay_ms),
      retryable_statuses: config.retryable_statuses.clone(),
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

  /// Total attempts including the first.
  pub fn max_attempts(&self) -> u32 {
    self.max_retries + 1
  }

  /// Delay before retry number `attempt + 1` (0-based):
  /// `base * multiplier^attempt`, capped at `max_delay`.
  pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
    if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
      return self.max_delay;
    }
    Duration::from_secs_f64(delay)
  }

  pub fn should_retry(&self, error: &ApiError) -> bool {
    match error {
      ApiError::Network { .. } | ApiError::Timeout { .. } => true,
      ApiError::Status { status, .. } => self.retryable_statuses.contains(status),
      _ => false,
    }
  }
}
