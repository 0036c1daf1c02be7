//! Retry with category-specific backoff and per-endpoint circuit breaking.

pub mod circuit_breaker;
pub mod retry;
pub mod types;


pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry};
pub use retry::{RetryPolicy, RetryStrategy};
pub use types::*;
