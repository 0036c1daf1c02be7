use crate::error::ClassifiedError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Limits applied to one in-flight stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamHealthConfig {
    /// Total wall-clock budget for the stream
    pub max_duration: Duration,
    /// Longest allowed silence between chunks
    pub max_stall: Duration,
}

impl Default for StreamHealthConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(120),
            max_stall: Duration::from_secs(30),
        }
    }
}

/// Progress of one streaming call.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub started_at: Instant,
    pub last_chunk_at: Option<Instant>,
    pub chunk_count: u64,
    pub bytes_received: u64,
}

impl StreamSession {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
            last_chunk_at: None,
            chunk_count: 0,
            bytes_received: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time since the last chunk, or since the start if nothing arrived yet.
    pub fn idle(&self) -> Duration {
        self.last_chunk_at.unwrap_or(self.started_at).elapsed()
    }
}

/// Everything a drained stream produced, including partial text when it
/// ended early.
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    pub text: String,
    pub chunk_count: u64,
    pub elapsed: Duration,
    pub error: Option<ClassifiedError>,
}

impl StreamOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// True when an error ended the stream after some output was received.
    pub fn interrupted(&self) -> bool {
        self.error.is_some() && self.chunk_count > 0
    }
}
