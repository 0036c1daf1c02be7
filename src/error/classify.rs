//! Conversion of raw failures into [`ClassifiedError`].
//!
//! Classification never fails: anything that matches no rule becomes an
//! `unknown`, medium-severity, recoverable error.

use crate::error::types::{ClassifiedError, ErrorCategory};
use regex::Regex;
use std::error::Error as StdError;
use std::io;
use std::sync::LazyLock;

const MAX_DETAIL_CHARS: usize = 300;

static CONTEXT_OVERFLOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(context[ _-]?(length|window|size)|maximum context|too many tokens|prompt is too long|tokens \+ .?max_new_tokens.? must be)",
    )
    .expect("context overflow pattern is valid")
});

/// Anything that can be turned into a [`ClassifiedError`].
pub trait Classify {
    fn classify(&self) -> ClassifiedError;
}

/// Classifies any supported failure.
pub fn classify<E: Classify + ?Sized>(failure: &E) -> ClassifiedError {
    failure.classify()
}

/// True when the text reports that the prompt does not fit the model's context window.
pub fn mentions_context_overflow(text: &str) -> bool {
    CONTEXT_OVERFLOW.is_match(text)
}

/// Pulls the human-readable error text out of the error payload shapes used by
/// local inference servers: `{"error":{"message":..}}`, `{"error":".."}` and
/// `{"message":..}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let text = match value.get("error") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Object(obj)) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
    .or_else(|| {
        value
            .get("message")
            .or_else(|| value.get("detail"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    })?;

    let text = text.trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

/// Classifies a non-success HTTP response.
///
/// The payload is inspected before the status code so that a context window
/// overflow reported as a plain 400 is still surfaced as `context_length`.
pub fn classify_status(status: u16, body: &str) -> ClassifiedError {
    let detail = extract_error_message(body).unwrap_or_else(|| truncate(body.trim()));
    let message = if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    };

    let category = if mentions_context_overflow(&detail) {
        ErrorCategory::ContextLength
    } else {
        match status {
            401 | 403 => ErrorCategory::Auth,
            404 => ErrorCategory::ModelNotFound,
            408 => ErrorCategory::Timeout,
            413 => ErrorCategory::ContextLength,
            429 => ErrorCategory::RateLimit,
            400 | 422 => ErrorCategory::InvalidRequest,
            500..=599 => ErrorCategory::ProviderError,
            _ => ErrorCategory::Unknown,
        }
    };

    ClassifiedError::new(category, message).with_context("status", status.to_string())
}

/// Classifies free-form error text, such as an error line inside a stream.
pub fn classify_message(text: &str) -> ClassifiedError {
    let lower = text.to_lowercase();
    let category = if mentions_context_overflow(text) {
        ErrorCategory::ContextLength
    } else if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("failed to connect")
        || lower.contains("dns error")
        || lower.contains("unreachable")
        || lower.contains("broken pipe")
    {
        ErrorCategory::Network
    } else if lower.contains("timed out") || lower.contains("timeout") || lower.contains("deadline")
    {
        ErrorCategory::Timeout
    } else if lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("invalid api key")
    {
        ErrorCategory::Auth
    } else if lower.contains("rate limit") || lower.contains("too many requests") {
        ErrorCategory::RateLimit
    } else if lower.contains("model")
        && (lower.contains("not found") || lower.contains("does not exist"))
    {
        ErrorCategory::ModelNotFound
    } else if lower.contains("no such file") {
        ErrorCategory::FileNotFound
    } else if lower.contains("out of memory") || lower.contains("internal server error") {
        ErrorCategory::ProviderError
    } else {
        ErrorCategory::Unknown
    };

    ClassifiedError::new(category, truncate(text.trim()))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_DETAIL_CHARS {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(MAX_DETAIL_CHARS).collect();
        out.push_str("...");
        out
    }
}

fn find_io_source<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        current = err.source();
    }
    None
}

impl Classify for reqwest::Error {
    fn classify(&self) -> ClassifiedError {
        let mut classified = if self.is_timeout() {
            ClassifiedError::timeout(format!("request timed out: {}", self))
        } else if self.is_connect() {
            let reason = find_io_source(self)
                .map(|e| e.to_string())
                .unwrap_or_else(|| self.to_string());
            ClassifiedError::network(format!("connection failed: {}", reason))
        } else if self.is_decode() {
            ClassifiedError::parse(format!("could not decode response: {}", self))
        } else if self.is_builder() {
            ClassifiedError::configuration(format!("invalid request: {}", self))
        } else if let Some(status) = self.status() {
            classify_status(status.as_u16(), "")
        } else if let Some(io_err) = find_io_source(self) {
            io_err.classify()
        } else if self.is_body() || self.is_request() {
            ClassifiedError::network(format!("transport error: {}", self))
        } else {
            ClassifiedError::new(ErrorCategory::Unknown, self.to_string())
        };

        if let Some(url) = self.url() {
            classified = classified.with_context("url", url.as_str());
        }
        classified
    }
}

impl Classify for io::Error {
    fn classify(&self) -> ClassifiedError {
        let category = match self.kind() {
            io::ErrorKind::NotFound => ErrorCategory::FileNotFound,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::UnexpectedEof => ErrorCategory::Network,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorCategory::Timeout,
            io::ErrorKind::InvalidData => ErrorCategory::ParseError,
            io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidInput => {
                ErrorCategory::Configuration
            }
            _ => return classify_message(&self.to_string()),
        };
        ClassifiedError::new(category, self.to_string())
    }
}

impl Classify for serde_json::Error {
    fn classify(&self) -> ClassifiedError {
        ClassifiedError::parse(format!("malformed JSON: {}", self))
            .with_context("line", self.line().to_string())
    }
}

impl Classify for tokio::time::error::Elapsed {
    fn classify(&self) -> ClassifiedError {
        ClassifiedError::timeout("operation exceeded its deadline")
    }
}

impl Classify for url::ParseError {
    fn classify(&self) -> ClassifiedError {
        ClassifiedError::configuration(format!("invalid endpoint URL: {}", self))
    }
}

impl Classify for str {
    fn classify(&self) -> ClassifiedError {
        classify_message(self)
    }
}

impl Classify for ClassifiedError {
    fn classify(&self) -> ClassifiedError {
        self.clone()
    }
}

impl From<reqwest::Error> for ClassifiedError {
    fn from(error: reqwest::Error) -> Self {
        error.classify()
    }
}

impl From<io::Error> for ClassifiedError {
    fn from(error: io::Error) -> Self {
        error.classify()
    }
}

impl From<serde_json::Error> for ClassifiedError {
    fn from(error: serde_json::Error) -> Self {
        // serde_json::Error has an inherent `classify` returning its own category
        Classify::classify(&error)
    }
}

impl From<tokio::time::error::Elapsed> for ClassifiedError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        error.classify()
    }
}

impl From<url::ParseError> for ClassifiedError {
    fn from(error: url::ParseError) -> Self {
        error.classify()
    }
}
