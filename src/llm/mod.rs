pub mod detector;
pub mod framing;
pub mod http;
pub mod lmstudio_provider;
pub mod ollama_provider;
pub mod openai_provider;
pub mod provider;
pub mod resilient;
pub mod tgi_provider;
pub mod types;
pub mod vllm_provider;

pub use detector::{
    DEFAULT_PROFILES, DetectedProvider, ProviderDetector, ProviderFactory, ProviderProfile,
};
pub use lmstudio_provider::LMStudioProvider;
pub use ollama_provider::OllamaProvider;
pub use openai_provider::{OpenAICompatClient, OpenAICompatibleProvider};
pub use provider::{LLMProvider, TextStream};
pub use resilient::ResilientProvider;
pub use tgi_provider::TGIProvider;
pub use types::*;
pub use vllm_provider::VLLMProvider;
