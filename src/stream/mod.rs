//! Health monitoring for in-flight streaming responses.

pub mod monitor;
pub mod types;

#[cfg(test)]
mod tests;

pub use monitor::{StreamHealthMonitor, collect_stream, monitor_stream, watch_stream};
pub use types::*;
