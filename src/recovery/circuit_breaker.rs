use crate::error::ClassifiedError;
use crate::llm::types::ProviderEndpoint;
use crate::recovery::types::{CircuitBreakerConfig, CircuitSnapshot, CircuitState};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Start of the half-open trial call, while one is running
    trial_started: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_started: None,
        }
    }
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Closed/open/half-open breaker guarding one provider endpoint.
///
/// State only changes through [`CircuitBreaker::call`]: admission and outcome
/// recording both take the state mutex, so concurrent callers see a single
/// consistent sequence of transitions.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::closed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Runs `operation` if the circuit admits it.
    ///
    /// While open, fails immediately with a circuit-open error and does not
    /// invoke the operation.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ClassifiedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let admission = self.admit().await?;
        let result = operation().await;
        let failure = result.as_ref().err();
        self.record(admission, failure).await;
        result
    }

    pub async fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock().await;
        let retry_in = match state.state {
            CircuitState::Open => Some(self.remaining(&state)),
            _ => None,
        };
        CircuitSnapshot {
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            retry_in,
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    fn remaining(&self, state: &BreakerState) -> Duration {
        state
            .opened_at
            .map(|opened| self.config.recovery_timeout.saturating_sub(opened.elapsed()))
            .unwrap_or_default()
    }

    async fn admit(&self) -> Result<Admission, ClassifiedError> {
        let mut state = self.state.lock().await;
        match state.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let remaining = self.remaining(&state);
                if remaining.is_zero() {
                    info!("Circuit for {} half-open, admitting a trial call", self.name);
                    state.state = CircuitState::HalfOpen;
                    state.trial_started = Some(Instant::now());
                    Ok(Admission::Trial)
                } else {
                    debug!("Circuit for {} open, rejecting call", self.name);
                    Err(ClassifiedError::circuit_open(&self.name, remaining))
                }
            }
            CircuitState::HalfOpen => {
                // A trial whose caller went away without reporting back is
                // considered abandoned after one recovery period.
                let trial_running = state
                    .trial_started
                    .is_some_and(|started| started.elapsed() < self.config.recovery_timeout);
                if trial_running {
                    Err(ClassifiedError::circuit_open(
                        &self.name,
                        self.config.recovery_timeout,
                    ))
                } else {
                    state.trial_started = Some(Instant::now());
                    Ok(Admission::Trial)
                }
            }
        }
    }

    async fn record(&self, admission: Admission, failure: Option<&ClassifiedError>) {
        let mut state = self.state.lock().await;
        if admission == Admission::Trial {
            state.trial_started = None;
        }

        match failure {
            None => {
                if state.state != CircuitState::Closed {
                    info!("Circuit for {} closed after successful trial", self.name);
                }
                *state = BreakerState::closed();
            }
            Some(error) if !counts_as_failure(error) => {
                debug!(
                    "Circuit for {} ignoring {} failure",
                    self.name, error.category
                );
            }
            Some(error) => {
                state.consecutive_failures += 1;
                let reopen = admission == Admission::Trial
                    || state.consecutive_failures >= self.config.failure_threshold;
                if reopen && state.state != CircuitState::Open {
                    warn!(
                        "Circuit for {} opened after {} consecutive failures ({}); pausing for {}s",
                        self.name,
                        state.consecutive_failures,
                        error.category,
                        self.config.recovery_timeout.as_secs()
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
        }
    }
}

/// Failures caused by the request itself say nothing about endpoint health.
fn counts_as_failure(error: &ClassifiedError) -> bool {
    !(error.is_cancelled() || error.is_circuit_open() || error.category.is_client_fault())
}

/// One breaker per endpoint, created on first use.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn breaker_for(&self, endpoint: &ProviderEndpoint) -> Arc<CircuitBreaker> {
        let key = endpoint.base_url();
        self.breakers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, self.config.clone())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
