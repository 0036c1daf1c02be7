//! Serializes streaming turns within one interactive session.
//!
//! At most one turn streams at a time, and accepted inputs are spaced by a
//! minimum interval so a burst of keystrokes or a double submit cannot start
//! overlapping turns.

use crate::error::{ClassifiedError, ErrorCategory, Severity};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub min_input_interval: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_input_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("a response is still streaming")]
    Busy,
    #[error("input arrived too soon, wait {}ms", .wait.as_millis())]
    TooSoon { wait: Duration },
}

impl From<GuardError> for ClassifiedError {
    fn from(error: GuardError) -> Self {
        let suggestion = match &error {
            GuardError::Busy => "Wait for the current response to finish, or interrupt it first.",
            GuardError::TooSoon { .. } => "Submit the input again in a moment.",
        };
        ClassifiedError::new(ErrorCategory::InvalidRequest, error.to_string())
            .with_severity(Severity::Low)
            .with_suggestion(suggestion)
    }
}

/// Answer to "may the user submit input right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl InputDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(error: &GuardError) -> Self {
        Self {
            allowed: false,
            reason: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct GuardState {
    is_streaming: bool,
    last_input_at: Option<Instant>,
    active: Option<CancellationToken>,
}

/// Per-session guard; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGuard {
    config: GuardConfig,
    state: Arc<Mutex<GuardState>>,
    operation_lock: Arc<AsyncMutex<()>>,
}

impl ConcurrencyGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
            operation_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, GuardState> {
        // The state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admission(&self, state: &GuardState) -> Result<(), GuardError> {
        if state.is_streaming {
            return Err(GuardError::Busy);
        }
        if let Some(last) = state.last_input_at {
            let since = last.elapsed();
            if since < self.config.min_input_interval {
                return Err(GuardError::TooSoon {
                    wait: self.config.min_input_interval - since,
                });
            }
        }
        Ok(())
    }

    /// Whether input would be accepted now. Does not record anything.
    pub fn can_accept_input(&self) -> InputDecision {
        let state = self.lock_state();
        match self.admission(&state) {
            Ok(()) => InputDecision::allow(),
            Err(error) => InputDecision::deny(&error),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.lock_state().is_streaming
    }

    /// Starts a streaming turn.
    ///
    /// The returned permit keeps the session marked as streaming until it is
    /// dropped, however the turn ends.
    pub fn begin_turn(&self) -> Result<StreamingPermit, GuardError> {
        let lock = self
            .operation_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| GuardError::Busy)?;

        let mut state = self.lock_state();
        self.admission(&state)?;

        let cancel = CancellationToken::new();
        state.is_streaming = true;
        state.last_input_at = Some(Instant::now());
        state.active = Some(cancel.clone());
        debug!("Streaming turn started");

        Ok(StreamingPermit {
            state: self.state.clone(),
            cancel,
            _lock: lock,
        })
    }

    /// Cancels the active turn, if any. Returns whether one was running.
    pub fn cancel_active(&self) -> bool {
        match &self.lock_state().active {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Proof that the holder owns the session's single streaming slot.
#[derive(Debug)]
pub struct StreamingPermit {
    state: Arc<Mutex<GuardState>>,
    cancel: CancellationToken,
    // Released after `drop` below has cleared the streaming flag
    _lock: OwnedMutexGuard<()>,
}

impl StreamingPermit {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamingPermit {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.is_streaming = false;
        state.active = None;
        debug!("Streaming turn finished");
    }
}
