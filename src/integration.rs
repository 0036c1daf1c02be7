//! # Assistant Session Orchestration
//!
//! Ties the resilience layer together for one interactive session.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                  AssistantSession                     │
//! │  ┌──────────────┐  ┌────────────────────────────────┐ │
//! │  │ Concurrency  │  │ ResilientProvider              │ │
//! │  │ Guard        │  │  CircuitBreaker > Retry > LLM  │ │
//! │  └──────────────┘  └────────────────────────────────┘ │
//! │            └──── monitored stream ────┘               │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! A turn is admitted by the guard, established through the breaker and retry
//! strategy, and consumed under the stream health monitor. The permit is held
//! until the stream is fully drained or has failed.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use localcode::{AssistantConfig, AssistantSession};
//! use localcode::llm::{ChatMessage, GenerationOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = AssistantSession::connect(AssistantConfig::default()).await?;
//!
//!     let outcome = session
//!         .submit(
//!             vec![ChatMessage::user("Explain this stack trace")],
//!             GenerationOptions::default(),
//!             |chunk| print!("{}", chunk),
//!         )
//!         .await?;
//!
//!     if let Some(error) = outcome.error {
//!         eprintln!("{}", error.user_message());
//!     }
//!     Ok(())
//! }
//! ```

use crate::error::{ClassifiedError, ErrorCategory};
use crate::llm::detector::{DEFAULT_PROFILES, DetectedProvider, ProviderDetector};
use crate::llm::{
    ChatMessage, ChatRequest, GenerationOptions, LLMProvider, ModelInfo, ProviderCapabilities,
    ProviderConfig, ProviderEndpoint, ProviderKind, ResilientProvider,
};
use crate::recovery::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitSnapshot, RetryConfig, RetryStrategy,
};
use crate::session::{ConcurrencyGuard, GuardConfig};
use crate::stream::{StreamHealthConfig, StreamHealthMonitor, collect_stream, watch_stream};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ClassifiedError {
    fn from(error: ConfigError) -> Self {
        let category = match &error {
            ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorCategory::FileNotFound
            }
            _ => ErrorCategory::Configuration,
        };
        ClassifiedError::new(category, error.to_string())
    }
}

/// Unified configuration for every part of the resilience layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub connection: ProviderConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub stream: StreamHealthConfig,
    pub guard: GuardConfig,
}

impl AssistantConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AssistantConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `LOCALCODE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = non_empty(crate::env::vars::ENDPOINT) {
            self.connection.endpoint = Some(endpoint);
        }
        if let Some(provider) = non_empty(crate::env::vars::PROVIDER) {
            let kind = provider
                .parse::<ProviderKind>()
                .map_err(|e| ConfigError::Invalid(e.message))?;
            self.connection.provider = Some(kind);
        }
        if let Some(model) = non_empty(crate::env::vars::MODEL) {
            self.connection.default_model = Some(model);
        }
        if let Some(key) = non_empty(crate::env::vars::API_KEY) {
            self.connection.api_key = Some(key);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.connection.endpoint {
            ProviderEndpoint::parse(endpoint).map_err(|e| ConfigError::Invalid(e.message))?;
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.stream.max_stall.is_zero() || self.stream.max_duration.is_zero() {
            return Err(ConfigError::Invalid(
                "stream.max_stall and stream.max_duration must be positive".to_string(),
            ));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid(
                "retry.initial_delay must not exceed retry.max_delay".to_string(),
            ));
        }
        if self.connection.probe_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "connection.probe_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of one streaming turn that got past admission.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub model: String,
    pub text: String,
    pub chunk_count: u64,
    pub elapsed: Duration,
    pub error: Option<ClassifiedError>,
}

impl TurnOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// True when an error ended the stream after partial output.
    pub fn interrupted(&self) -> bool {
        self.error.is_some() && self.chunk_count > 0
    }
}

/// Health report produced by [`test_provider`].
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDiagnostics {
    pub provider_name: String,
    pub kind: ProviderKind,
    pub endpoint: String,
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub models: Vec<ModelInfo>,
    pub capabilities: ProviderCapabilities,
    pub circuit: Option<CircuitSnapshot>,
    pub error: Option<ClassifiedError>,
    pub checked_at: DateTime<Utc>,
}

impl ProviderDiagnostics {
    pub fn is_healthy(&self) -> bool {
        self.reachable && self.error.is_none()
    }
}

/// Probes a provider and lists its models.
pub async fn test_provider(provider: &dyn LLMProvider) -> ProviderDiagnostics {
    let started = Instant::now();
    let reachable = provider.detect().await;
    let latency_ms = reachable.then(|| started.elapsed().as_millis() as u64);

    let (models, error) = if reachable {
        match provider.list_models().await {
            Ok(models) => (models, None),
            Err(e) => (Vec::new(), Some(e)),
        }
    } else {
        let error = ClassifiedError::network(format!(
            "{} did not answer at {}",
            provider.kind().label(),
            provider.endpoint()
        ));
        (Vec::new(), Some(error))
    };

    ProviderDiagnostics {
        provider_name: provider.provider_name().to_string(),
        kind: provider.kind(),
        endpoint: provider.endpoint().base_url(),
        reachable,
        latency_ms,
        models,
        capabilities: provider.get_capabilities(),
        circuit: None,
        error,
        checked_at: Utc::now(),
    }
}

/// One interactive session bound to a single provider endpoint.
pub struct AssistantSession {
    id: Uuid,
    config: AssistantConfig,
    provider: Arc<ResilientProvider>,
    breakers: Arc<CircuitBreakerRegistry>,
    guard: ConcurrencyGuard,
}

impl AssistantSession {
    /// Connects to the configured endpoint, or detects a running server.
    pub async fn connect(config: AssistantConfig) -> Result<Self, ClassifiedError> {
        config.validate()?;
        let detected = Self::locate(&config).await?;
        Ok(Self::from_detected(config, detected))
    }

    async fn locate(config: &AssistantConfig) -> Result<DetectedProvider, ClassifiedError> {
        let connection = &config.connection;
        let detector = ProviderDetector::new(connection.clone());

        if let Some(endpoint) = &connection.endpoint {
            let endpoint = ProviderEndpoint::parse(endpoint)?;
            return detector.detect_at(endpoint, connection.provider).await;
        }

        if let Some(kind) = connection.provider {
            let mut last_error = None;
            for profile in DEFAULT_PROFILES.iter().filter(|p| p.kind == kind) {
                match detector.detect_at(profile.endpoint(), Some(kind)).await {
                    Ok(detected) => return Ok(detected),
                    Err(e) => last_error = Some(e),
                }
            }
            return Err(last_error.unwrap_or_else(|| {
                ClassifiedError::configuration(format!("no default endpoint for {}", kind))
            }));
        }

        detector.detect().await.ok_or_else(|| {
            let ports: Vec<String> = detector
                .suggestions()
                .iter()
                .map(|p| format!("{} ({})", p.label, p.port))
                .collect();
            ClassifiedError::new(ErrorCategory::Network, "no local LLM server found")
                .with_suggestion(format!(
                    "Start one of: {}, or pass --endpoint host:port.",
                    ports.join(", ")
                ))
        })
    }

    pub fn from_detected(config: AssistantConfig, detected: DetectedProvider) -> Self {
        Self::from_provider(config, detected.provider)
    }

    /// Wraps an already-built adapter in the session's retry and breaker.
    pub fn from_provider(config: AssistantConfig, provider: Arc<dyn LLMProvider>) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone()));
        Self::with_breakers(config, provider, breakers)
    }

    /// Like [`AssistantSession::from_provider`], taking the endpoint's breaker
    /// from `breakers` so sessions sharing a registry see the same circuit.
    pub fn with_breakers(
        config: AssistantConfig,
        provider: Arc<dyn LLMProvider>,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        let breaker = breakers.breaker_for(provider.endpoint());
        let retry = RetryStrategy::new(config.retry.clone());
        let guard = ConcurrencyGuard::new(config.guard.clone());
        let id = Uuid::new_v4();

        info!(
            "Session {} using {} at {}",
            id,
            provider.kind().label(),
            provider.endpoint()
        );

        Self {
            id,
            provider: Arc::new(ResilientProvider::new(provider, retry, breaker)),
            breakers,
            config,
            guard,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<ResilientProvider> {
        &self.provider
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// The configured default model, or the first model the server lists.
    pub async fn resolve_model(&self) -> Result<String, ClassifiedError> {
        if let Some(model) = &self.config.connection.default_model {
            return Ok(model.clone());
        }
        let models = self.provider.list_models().await?;
        models.into_iter().next().map(|m| m.name).ok_or_else(|| {
            ClassifiedError::new(
                ErrorCategory::ModelNotFound,
                format!("{} has no models available", self.provider.endpoint()),
            )
        })
    }

    /// Runs one streaming turn, passing each chunk to `on_chunk`.
    ///
    /// `Err` means the turn never started: it was rejected by the guard, no
    /// model could be resolved, the stream could not be established, or it
    /// was interrupted or stalled before the first byte. Once streaming
    /// began, failures are reported in [`TurnOutcome::error`] alongside the
    /// partial text.
    pub async fn submit<F>(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerationOptions,
        on_chunk: F,
    ) -> Result<TurnOutcome, ClassifiedError>
    where
        F: FnMut(&str),
    {
        let permit = self.guard.begin_turn()?;
        let monitor =
            StreamHealthMonitor::new(self.config.stream.clone(), permit.cancel_token().clone());

        let (model, stream) = monitor
            .establish(async move {
                let model = self.resolve_model().await?;
                let request = ChatRequest::new(model.clone(), messages).with_options(options);
                let stream = self.provider.stream_completion(request).await?;
                Ok::<_, ClassifiedError>((model, stream))
            })
            .await
            .map_err(|e| {
                error!("Could not start stream: {}", e);
                e
            })?;

        let outcome = collect_stream(watch_stream(stream, monitor), on_chunk).await;
        drop(permit);

        if let Some(e) = &outcome.error {
            warn!(
                "Turn ended early after {} chunks: {}",
                outcome.chunk_count, e
            );
        }

        Ok(TurnOutcome {
            model,
            text: outcome.text,
            chunk_count: outcome.chunk_count,
            elapsed: outcome.elapsed,
            error: outcome.error,
        })
    }

    /// Cancels the turn in progress. Returns whether one was running.
    pub fn interrupt(&self) -> bool {
        self.guard.cancel_active()
    }

    pub async fn test_provider(&self) -> ProviderDiagnostics {
        let mut diagnostics = test_provider(self.provider.as_ref()).await;
        diagnostics.circuit = Some(self.provider.breaker().snapshot().await);
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let config = AssistantConfig::default();
        let toml_string = config.to_toml_string().unwrap();
        let parsed = AssistantConfig::from_toml_str(&toml_string).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = AssistantConfig::from_toml_str(
            r#"
            [connection]
            endpoint = "localhost:11434"
            provider = "ollama"

            [circuit_breaker]
            failure_threshold = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.connection.provider, Some(ProviderKind::Ollama));
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.stream.max_stall, Duration::from_secs(30));
        assert_eq!(config.guard.min_input_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AssistantConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AssistantConfig::default();
        config.connection.endpoint = Some("localhost:notaport".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AssistantConfig::default();
        config
            .apply_env_overrides(|name| match name {
                "LOCALCODE_ENDPOINT" => Some("127.0.0.1:8000".to_string()),
                "LOCALCODE_PROVIDER" => Some("vllm".to_string()),
                "LOCALCODE_MODEL" => Some(" ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.connection.endpoint.as_deref(), Some("127.0.0.1:8000"));
        assert_eq!(config.connection.provider, Some(ProviderKind::Vllm));
        assert_eq!(config.connection.default_model, None);

        let err = config
            .apply_env_overrides(|name| (name == "LOCALCODE_PROVIDER").then(|| "gpt".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("unknown provider type"));
    }

    #[test]
    fn test_missing_file_classifies_as_file_not_found() {
        let err = AssistantConfig::from_toml_file("/nonexistent/localcode.toml").unwrap_err();
        assert_eq!(ClassifiedError::from(err).category, ErrorCategory::FileNotFound);
    }
}
