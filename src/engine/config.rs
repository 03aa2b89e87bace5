use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single provider call
    pub dispatch_timeout: Duration,
    /// Retry policy for transient delivery failures
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Create an engine config from environment variables
    /// HERALD_DISPATCH_TIMEOUT_MS=15000
    /// HERALD_RETRY_MAX_ATTEMPTS=5
    /// HERALD_RETRY_INITIAL_BACKOFF_MS=500
    /// HERALD_RETRY_MAX_BACKOFF_MS=30000
    /// HERALD_RETRY_JITTER=true
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let dispatch_timeout = env_millis("HERALD_DISPATCH_TIMEOUT_MS")
            .unwrap_or(defaults.dispatch_timeout);
        let max_attempts = std::env::var("HERALD_RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.retry.max_attempts);
        let initial_backoff = env_millis("HERALD_RETRY_INITIAL_BACKOFF_MS")
            .unwrap_or(defaults.retry.initial_backoff);
        let max_backoff = env_millis("HERALD_RETRY_MAX_BACKOFF_MS")
            .unwrap_or(defaults.retry.max_backoff);
        let jitter = std::env::var("HERALD_RETRY_JITTER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.retry.jitter);

        Self {
            dispatch_timeout,
            retry: RetryPolicy {
                max_attempts,
                initial_backoff,
                max_backoff,
                jitter,
                ..defaults.retry
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    /// Add up to 50% random delay to each backoff
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy that retries immediately, for tests and local tooling
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1 for the first retry)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        let delay = self
            .initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff);

        if self.jitter && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 2);
            (delay + Duration::from_millis(extra)).min(self.max_backoff)
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
            jitter: true,
        }
    }
}
