use crate::error::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-category overrides of the retry count.
///
/// Only recoverable categories can be overridden; the others never retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOverrides {
    pub network: Option<u32>,
    pub timeout: Option<u32>,
    pub rate_limit: Option<u32>,
    pub provider_error: Option<u32>,
    pub parse_error: Option<u32>,
    pub unknown: Option<u32>,
}

impl RetryOverrides {
    pub fn get(&self, category: ErrorCategory) -> Option<u32> {
        match category {
            ErrorCategory::Network => self.network,
            ErrorCategory::Timeout => self.timeout,
            ErrorCategory::RateLimit => self.rate_limit,
            ErrorCategory::ProviderError => self.provider_error,
            ErrorCategory::ParseError => self.parse_error,
            ErrorCategory::Unknown => self.unknown,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for any single delay, including server `Retry-After` hints
    pub max_delay: Duration,
    /// Randomize each delay by up to ±10%
    pub jitter: bool,
    pub overrides: RetryOverrides,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            jitter: true,
            overrides: RetryOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Time left before a trial call is admitted, when open
    pub retry_in: Option<Duration>,
}
