use crate::error::{ClassifiedError, ErrorCategory};
use crate::recovery::types::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry behavior for one error category.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total invocations are at most
    /// `max_attempts + 1`
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    /// Built-in retry count and backoff factor for a category.
    pub fn defaults_for(category: ErrorCategory) -> (u32, f64) {
        match category {
            ErrorCategory::Network => (3, 2.0),
            ErrorCategory::Timeout => (2, 1.5),
            ErrorCategory::RateLimit => (5, 3.0),
            ErrorCategory::ProviderError => (2, 2.0),
            ErrorCategory::ParseError => (1, 1.0),
            ErrorCategory::Unknown => (1, 2.0),
            _ => (0, 1.0),
        }
    }

    pub fn for_category(category: ErrorCategory, config: &RetryConfig) -> Self {
        let (default_attempts, backoff_factor) = Self::defaults_for(category);
        let max_attempts = if category.is_recoverable() {
            config.overrides.get(category).unwrap_or(default_attempts)
        } else {
            0
        };
        Self {
            max_attempts,
            backoff_factor,
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            jitter: config.jitter,
        }
    }

    /// Delay before retry number `attempt + 1`: `initial * factor^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let mut secs = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // ±10%
            let jitter = (rand::random::<f64>() - 0.5) * 0.2;
            secs *= 1.0 + jitter;
        }

        Duration::from_secs_f64(secs.max(0.0)).min(self.max_delay)
    }
}

/// Re-runs failed operations according to the category retry table.
#[derive(Debug, Clone, Default)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn policy(&self, category: ErrorCategory) -> RetryPolicy {
        RetryPolicy::for_category(category, &self.config)
    }

    /// Runs `operation` with the retry budget of `category`.
    ///
    /// A failure that classifies as non-recoverable is returned at once.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        category: ErrorCategory,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let policy = self.policy(category);
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.recoverable || attempt >= policy.max_attempts {
                        return Err(error);
                    }
                    let delay = self.delay_with_hint(&policy, attempt, &error);
                    warn!(
                        "Retrying {} failure (attempt {}/{}) in {}ms: {}",
                        category,
                        attempt + 1,
                        policy.max_attempts,
                        delay.as_millis(),
                        error.message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`RetryStrategy::execute_with_retry`], but each failure is retried
    /// under the policy of its own category.
    ///
    /// The attempt counter is shared across categories, so a call never runs
    /// more than the largest budget among the categories it hit, plus one.
    pub async fn execute_classified<T, F, Fut>(&self, mut operation: F) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if error.is_cancelled() || error.is_circuit_open() {
                        return Err(error);
                    }
                    let policy = self.policy(error.category);
                    if !error.recoverable || attempt >= policy.max_attempts {
                        debug!(
                            "Giving up on {} failure after {} attempts",
                            error.category,
                            attempt + 1
                        );
                        return Err(error);
                    }
                    let delay = self.delay_with_hint(&policy, attempt, &error);
                    warn!(
                        "Retrying {} failure (attempt {}/{}) in {}ms: {}",
                        error.category,
                        attempt + 1,
                        policy.max_attempts,
                        delay.as_millis(),
                        error.message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// The backoff delay, stretched to a server `Retry-After` hint when the
    /// hint is longer, never past `max_delay`.
    fn delay_with_hint(&self, policy: &RetryPolicy, attempt: u32, error: &ClassifiedError) -> Duration {
        let delay = policy.delay_for(attempt);
        match error.retry_after() {
            Some(hint) if hint > delay => hint.min(policy.max_delay),
            _ => delay,
        }
    }
}
