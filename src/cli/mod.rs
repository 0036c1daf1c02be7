//! CLI-specific functionality for the localcode binary
//!
//! This module contains argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, ChatConfig, ExecutionMode, InteractiveConfig};
pub use config::ConfigDiscovery;
