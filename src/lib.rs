//! # localcode
//!
//! A client for local LLM servers that keeps a coding session usable when the
//! server misbehaves. Local inference fails differently from hosted APIs: the
//! model may still be loading, the GPU may run out of memory, the server may
//! accept one request at a time, or a stream may stall halfway through an
//! answer. This crate turns those failures into classified, recoverable
//! errors and contains them.
//!
//! ## Architecture Overview
//!
//! - **[`error`]**: Failure taxonomy with categories, severities and remediation hints
//! - **[`llm`]**: Adapters for Ollama, LM Studio, vLLM, TGI and generic
//!   OpenAI-compatible servers, plus endpoint detection
//! - **[`recovery`]**: Category-specific retry with backoff, and per-endpoint circuit breakers
//! - **[`stream`]**: Stall and duration watchdog for streaming responses
//! - **[`session`]**: Single-stream admission and input rate limiting
//! - **[`integration`]**: Configuration and the session that wires the layers together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use localcode::{AssistantConfig, AssistantSession};
//! use localcode::llm::{ChatMessage, GenerationOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = AssistantSession::connect(AssistantConfig::default()).await?;
//!     let diagnostics = session.test_provider().await;
//!     println!("{} healthy: {}", diagnostics.endpoint, diagnostics.is_healthy());
//!
//!     let outcome = session
//!         .submit(
//!             vec![ChatMessage::user("Write a binary search in Rust")],
//!             GenerationOptions::default(),
//!             |chunk| print!("{}", chunk),
//!         )
//!         .await?;
//!     println!("\n{} chunks", outcome.chunk_count);
//!     Ok(())
//! }
//! ```

/// Error classification.
///
/// Every failure observed anywhere in the crate is normalized into a
/// [`ClassifiedError`] that carries a category, a severity, whether a retry
/// could help, and a user-facing suggestion.
pub mod error;

/// Provider adapters and detection.
pub mod llm;

/// Retry strategy and circuit breaker.
pub mod recovery;

/// Stream health monitoring.
pub mod stream;

/// Concurrency guard for interactive sessions.
pub mod session;

/// Session orchestration and configuration.
pub mod integration;

/// Environment constants and path utilities.
pub mod env;

pub use error::{ClassifiedError, ErrorCategory, Severity};

pub use llm::{
    ChatMessage, ChatRequest, GenerationOptions, LLMProvider, ModelInfo, ProviderConfig,
    ProviderDetector, ProviderEndpoint, ProviderKind, ResilientProvider,
};

pub use recovery::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryStrategy};

pub use stream::{StreamHealthConfig, StreamHealthMonitor};

pub use session::{ConcurrencyGuard, GuardConfig};

pub use integration::{AssistantConfig, AssistantSession, ProviderDiagnostics, TurnOutcome};

// CLI module for command-line interface
pub mod cli;
