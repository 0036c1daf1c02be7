pub mod classify;
pub mod types;

#[cfg(test)]
mod tests;

pub use classify::{Classify, classify, classify_message, classify_status, extract_error_message};
pub use types::*;
