// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reconnect backoff strategies.
//!
//! Transports and drivers never retry on their own. The poll loop that owns a
//! device asks a [`RetryConfig`] how long to wait before the next connect
//! attempt.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ModbusError;

// =============================================================================
// RetryConfig
// =============================================================================

/// Reconnect policy of one device poller.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts allowed after the first failure. `None` keeps trying.
    pub max_retries: Option<u32>,
    /// Delay between attempts.
    pub strategy: RetryStrategy,
}

impl RetryConfig {
    /// Retries forever with the given strategy.
    pub fn unlimited(strategy: RetryStrategy) -> Self {
        Self {
            max_retries: None,
            strategy,
        }
    }

    /// Gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_retries: Some(0),
            strategy: RetryStrategy::Immediate,
        }
    }

    /// At most `max_retries` attempts with exponential backoff.
    pub fn exponential(max_retries: u32, backoff: ExponentialBackoff) -> Self {
        Self {
            max_retries: Some(max_retries),
            strategy: RetryStrategy::Exponential(backoff),
        }
    }

    /// Decides whether attempt number `attempt` (1-based) may follow a failure.
    pub fn decide(&self, retryable: bool, attempt: u32) -> RetryDecision {
        if !retryable {
            return RetryDecision::DoNotRetry;
        }

        match self.max_retries {
            Some(max) if attempt > max => RetryDecision::DoNotRetry,
            _ => RetryDecision::Retry(self.strategy.delay(attempt.saturating_sub(1))),
        }
    }

    /// Decides whether to retry after `error`.
    pub fn should_retry(&self, error: &ModbusError, attempt: u32) -> RetryDecision {
        self.decide(error.is_retryable(), attempt)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::unlimited(RetryStrategy::default())
    }
}

/// Whether and when to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then reconnect.
    Retry(Duration),
    /// Give up and surface the error.
    DoNotRetry,
}

// =============================================================================
// RetryStrategy
// =============================================================================

/// How the wait grows between attempts.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Reconnect at once.
    Immediate,
    /// Same wait every time.
    Fixed(Duration),
    /// Doubling wait, see [`ExponentialBackoff`].
    Exponential(ExponentialBackoff),
}

impl RetryStrategy {
    /// Wait before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed(duration) => *duration,
            Self::Exponential(exp) => exp.delay(attempt),
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential(ExponentialBackoff::default())
    }
}

impl From<ExponentialBackoff> for RetryStrategy {
    fn from(backoff: ExponentialBackoff) -> Self {
        Self::Exponential(backoff)
    }
}

// =============================================================================
// ExponentialBackoff
// =============================================================================

/// Exponential backoff: `initial_delay * multiplier^attempt`, capped at
/// `max_delay`, with optional symmetric jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay")]
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound on any wait.
    #[serde(default = "default_max_delay")]
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Factor applied per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 = none, 1.0 = up to ±100%).
    #[serde(default = "default_jitter", alias = "jitter")]
    pub jitter_factor: f64,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

impl ExponentialBackoff {
    /// Creates a backoff without jitter.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: default_multiplier(),
            jitter_factor: 0.0,
        }
    }

    /// Sets the multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter factor, clamped to `0.0..=1.0`.
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Wait before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter_factor = self.jitter_factor.clamp(0.0, 1.0);
        let final_delay = if jitter_factor > 0.0 && capped > 0.0 {
            let jitter_range = capped * jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;

    #[test]
    fn test_fixed_and_immediate_waits() {
        let strategy = RetryStrategy::Fixed(Duration::from_millis(100));

        assert_eq!(strategy.delay(0), Duration::from_millis(100));
        assert_eq!(strategy.delay(5), Duration::from_millis(100));
        assert_eq!(RetryStrategy::Immediate.delay(3), Duration::ZERO);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(10), Duration::from_secs(10));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter(0.5);

        for _ in 0..20 {
            let delay = backoff.delay(0);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_backoff_custom_multiplier() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
            .with_multiplier(3.0);

        assert_eq!(backoff.delay(1), Duration::from_millis(300));
        assert_eq!(backoff.delay(2), Duration::from_millis(900));
    }

    #[test]
    fn test_decide_respects_limit_and_retryability() {
        let config = RetryConfig::exponential(
            2,
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1)),
        );

        assert_eq!(config.decide(true, 1), RetryDecision::Retry(Duration::from_millis(100)));
        assert_eq!(config.decide(true, 2), RetryDecision::Retry(Duration::from_millis(200)));
        assert_eq!(config.decide(true, 3), RetryDecision::DoNotRetry);
        assert_eq!(config.decide(false, 1), RetryDecision::DoNotRetry);
        assert_eq!(RetryConfig::no_retry().decide(true, 1), RetryDecision::DoNotRetry);
    }

    #[test]
    fn test_should_retry_uses_error_classification() {
        let config = RetryConfig::unlimited(RetryStrategy::Fixed(Duration::from_secs(1)));

        assert_eq!(
            config.should_retry(&ModbusError::not_connected(), 50),
            RetryDecision::Retry(Duration::from_secs(1))
        );

        let fatal = ModbusError::configuration(ConfigurationError::missing_field("host"));
        assert_eq!(config.should_retry(&fatal, 1), RetryDecision::DoNotRetry);
    }

    #[test]
    fn test_backoff_deserialize_defaults() {
        let backoff: ExponentialBackoff =
            serde_json::from_str(r#"{ "initial_delay": "500ms", "jitter": 0.0 }"#).unwrap();
        assert_eq!(backoff.initial_delay, Duration::from_millis(500));
        assert_eq!(backoff.max_delay, Duration::from_secs(60));
        assert_eq!(backoff.jitter_factor, 0.0);
    }
}
