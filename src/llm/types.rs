use crate::error::ClassifiedError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// The closed set of wire protocols this client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    LmStudio,
    Vllm,
    Tgi,
    OpenAiCompatible,
}

impl ProviderKind {
    /// Detection preference, most protocol-specific first.
    pub const SPECIFICITY_ORDER: [ProviderKind; 5] = [
        ProviderKind::Ollama,
        ProviderKind::LmStudio,
        ProviderKind::Vllm,
        ProviderKind::Tgi,
        ProviderKind::OpenAiCompatible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::LmStudio => "lm_studio",
            ProviderKind::Vllm => "vllm",
            ProviderKind::Tgi => "tgi",
            ProviderKind::OpenAiCompatible => "openai_compatible",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "Ollama",
            ProviderKind::LmStudio => "LM Studio",
            ProviderKind::Vllm => "vLLM",
            ProviderKind::Tgi => "Hugging Face TGI",
            ProviderKind::OpenAiCompatible => "OpenAI-compatible server",
        }
    }

    /// Position in [`ProviderKind::SPECIFICITY_ORDER`]; lower is more specific.
    pub fn specificity_rank(&self) -> usize {
        ProviderKind::SPECIFICITY_ORDER
            .iter()
            .position(|k| k == self)
            .unwrap_or(ProviderKind::SPECIFICITY_ORDER.len())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ClassifiedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "lm_studio" | "lmstudio" => Ok(ProviderKind::LmStudio),
            "vllm" => Ok(ProviderKind::Vllm),
            "tgi" | "text_generation_inference" => Ok(ProviderKind::Tgi),
            "openai_compatible" | "openai" | "generic" => Ok(ProviderKind::OpenAiCompatible),
            other => Err(ClassifiedError::configuration(format!(
                "unknown provider type '{}'; expected one of ollama, lm_studio, vllm, tgi, openai_compatible",
                other
            ))),
        }
    }
}

/// Where a provider listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ProviderEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            port,
        }
    }

    pub fn localhost(port: u16) -> Self {
        Self::new("localhost", port)
    }

    /// Parses `host:port`, `host` or a full `http(s)://host:port` URL.
    pub fn parse(input: &str) -> Result<Self, ClassifiedError> {
        let trimmed = input.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ClassifiedError::configuration("endpoint must not be empty"));
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };
        let url = Url::parse(&with_scheme)?;
        let host = url
            .host_str()
            .ok_or_else(|| ClassifiedError::configuration(format!("endpoint '{}' has no host", input)))?;
        let port = url.port_or_known_default().ok_or_else(|| {
            ClassifiedError::configuration(format!("endpoint '{}' has no port", input))
        })?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
        })
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Joins a path such as `/v1/models` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }
}

impl fmt::Display for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Generation options passed through from the conversation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub stop: Vec<String>,
}

/// One completion call: ordered messages, the model to use and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub options: GenerationOptions,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: model.into(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub vision: bool,
    pub embeddings: bool,
    pub json_mode: bool,
    pub function_calling: bool,
}

/// Snapshot of one model as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub context_window: Option<u32>,
    /// Quantization level or weight format, e.g. `Q4_K_M` or `gguf`.
    pub format_hint: Option<String>,
    pub family: Option<String>,
    pub size_bytes: Option<u64>,
    pub capabilities: ModelCapabilities,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context_window: None,
            format_hint: None,
            family: None,
            size_bytes: None,
            capabilities: ModelCapabilities::default(),
        }
    }
}

/// Static per-adapter capability descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
    pub supports_model_management: bool,
    pub supports_embeddings: bool,
    pub max_concurrent_requests: u32,
}

/// Transport settings for talking to one provider endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Explicit protocol; detected when absent
    pub provider: Option<ProviderKind>,
    /// Explicit endpoint (`host:port` or URL); scanned when absent
    pub endpoint: Option<String>,
    /// Bearer token for servers started with an API key
    pub api_key: Option<String>,
    pub default_model: Option<String>,
    /// Upper bound for a single-shot request, including the response body
    pub request_timeout: Duration,
    /// Upper bound for one detection probe
    pub probe_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: None,
            endpoint: None,
            api_key: None,
            default_model: None,
            request_timeout: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
        }
    }
}
