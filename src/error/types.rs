use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Fixed set of failure categories shared by retry policy and error display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    Auth,
    RateLimit,
    ModelNotFound,
    InvalidRequest,
    ContextLength,
    ProviderError,
    FileNotFound,
    ParseError,
    Configuration,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Conditions that need distinct handling by callers even though they map
/// onto an ordinary category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ErrorCondition {
    /// The circuit breaker for the endpoint is open; no request was made.
    CircuitOpen { retry_in: Duration },
    /// The operation was cancelled by the user or by the stream monitor.
    Cancelled,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 12] = [
        ErrorCategory::Network,
        ErrorCategory::Timeout,
        ErrorCategory::Auth,
        ErrorCategory::RateLimit,
        ErrorCategory::ModelNotFound,
        ErrorCategory::InvalidRequest,
        ErrorCategory::ContextLength,
        ErrorCategory::ProviderError,
        ErrorCategory::FileNotFound,
        ErrorCategory::ParseError,
        ErrorCategory::Configuration,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Auth => "auth",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::ModelNotFound => "model_not_found",
            ErrorCategory::InvalidRequest => "invalid_request",
            ErrorCategory::ContextLength => "context_length",
            ErrorCategory::ProviderError => "provider_error",
            ErrorCategory::FileNotFound => "file_not_found",
            ErrorCategory::ParseError => "parse_error",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Unknown => "unknown",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorCategory::Network => Severity::High,
            ErrorCategory::Timeout => Severity::Medium,
            ErrorCategory::Auth => Severity::High,
            ErrorCategory::RateLimit => Severity::Low,
            ErrorCategory::ModelNotFound => Severity::High,
            ErrorCategory::InvalidRequest => Severity::Medium,
            ErrorCategory::ContextLength => Severity::High,
            ErrorCategory::ProviderError => Severity::Medium,
            ErrorCategory::FileNotFound => Severity::Medium,
            ErrorCategory::ParseError => Severity::Medium,
            ErrorCategory::Configuration => Severity::Critical,
            ErrorCategory::Unknown => Severity::Medium,
        }
    }

    /// Whether a failure of this category can succeed if simply tried again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::RateLimit
                | ErrorCategory::ProviderError
                | ErrorCategory::ParseError
                | ErrorCategory::Unknown
        )
    }

    /// Failures caused by the request itself rather than by the endpoint's health.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Auth
                | ErrorCategory::ModelNotFound
                | ErrorCategory::InvalidRequest
                | ErrorCategory::ContextLength
                | ErrorCategory::Configuration
                | ErrorCategory::FileNotFound
        )
    }

    pub fn default_suggestion(&self) -> &'static str {
        match self {
            ErrorCategory::Network => {
                "Check that the local inference server is running and listening on the configured host and port."
            }
            ErrorCategory::Timeout => {
                "The server took too long to answer. Try a smaller model, a shorter prompt, or raise request_timeout."
            }
            ErrorCategory::Auth => {
                "The server rejected the credentials. Check the API key configured for this endpoint."
            }
            ErrorCategory::RateLimit => {
                "The server is throttling requests. Wait a moment before sending more."
            }
            ErrorCategory::ModelNotFound => {
                "The model is not available on this server. Run `localcode models` to list installed models or pull it first."
            }
            ErrorCategory::InvalidRequest => {
                "The server rejected the request parameters. Check the model name and generation options."
            }
            ErrorCategory::ContextLength => {
                "The prompt exceeds the model's context window. Shorten the conversation or choose a model with a larger context."
            }
            ErrorCategory::ProviderError => {
                "The inference server reported an internal error. Check its logs; it may still be loading the model."
            }
            ErrorCategory::FileNotFound => "A required file could not be found. Check the path.",
            ErrorCategory::ParseError => {
                "The server sent a response that could not be understood. Make sure the selected provider type matches the server."
            }
            ErrorCategory::Configuration => {
                "The configuration is invalid. Run `localcode show-config` to see which file is in use."
            }
            ErrorCategory::Unknown => "An unexpected error occurred. Re-run with --verbose for details.",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown error category '{}'", s))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A failure normalized into category, severity and recoverability.
///
/// Built once where the failure is observed and passed upward unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{category}: {message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub recoverable: bool,
    pub message: String,
    pub suggestion: String,
    pub source_context: BTreeMap<String, String>,
    pub condition: Option<ErrorCondition>,
}

impl ClassifiedError {
    /// Creates an error with the category's default severity, recoverability and suggestion.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            severity: category.default_severity(),
            recoverable: category.is_recoverable(),
            message: message.into(),
            suggestion: category.default_suggestion().to_string(),
            source_context: BTreeMap::new(),
            condition: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ParseError, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Configuration, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ProviderError, message)
    }

    /// Short-circuit failure reported while a breaker is open.
    pub fn circuit_open(endpoint: &str, retry_in: Duration) -> Self {
        let secs = retry_in.as_secs_f64().ceil() as u64;
        let mut error = Self::new(
            ErrorCategory::ProviderError,
            format!("provider unresponsive, will retry in {}s", secs),
        )
        .with_severity(Severity::High)
        .with_recoverable(false)
        .with_suggestion(format!(
            "{} failed repeatedly. Requests are paused for {}s to let it recover; check that the server is still running.",
            endpoint, secs
        ))
        .with_context("endpoint", endpoint)
        .with_context("retry_in_ms", retry_in.as_millis().to_string());
        error.condition = Some(ErrorCondition::CircuitOpen { retry_in });
        error
    }

    /// Failure used when an operation is stopped on purpose.
    pub fn cancelled(message: impl Into<String>) -> Self {
        let mut error = Self::new(ErrorCategory::Unknown, message)
            .with_severity(Severity::Low)
            .with_recoverable(false)
            .with_suggestion("The operation was cancelled; partial output, if any, is kept.");
        error.condition = Some(ErrorCondition::Cancelled);
        error
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.source_context.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self.condition, Some(ErrorCondition::CircuitOpen { .. }))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.condition, Some(ErrorCondition::Cancelled))
    }

    pub fn context(&self, key: &str) -> Option<&str> {
        self.source_context.get(key).map(String::as_str)
    }

    /// Server-provided wait hint, if the failure carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        self.context("retry_after_ms")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// Text meant for direct display: the message followed by the remediation hint.
    pub fn user_message(&self) -> String {
        format!("{} [{}]\n  hint: {}", self.message, self.category, self.suggestion)
    }
}
