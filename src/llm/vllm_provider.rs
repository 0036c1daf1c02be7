//! vLLM adapter: the OpenAI-compatible API plus vLLM's `/version` endpoint,
//! which generic OpenAI-style servers do not expose.

use crate::error::ClassifiedError;
use crate::llm::openai_provider::OpenAICompatClient;
use crate::llm::provider::{LLMProvider, TextStream};
use crate::llm::types::{
    ChatRequest, ModelInfo, ProviderCapabilities, ProviderConfig, ProviderEndpoint, ProviderKind,
};
use futures::future::BoxFuture;
use tracing::debug;

pub struct VLLMProvider {
    client: OpenAICompatClient,
}

impl VLLMProvider {
    pub const DEFAULT_PORT: u16 = 8000;

    pub fn new(endpoint: ProviderEndpoint, config: &ProviderConfig) -> Result<Self, ClassifiedError> {
        Ok(Self {
            client: OpenAICompatClient::new(endpoint, config)?,
        })
    }
}

impl LLMProvider for VLLMProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Vllm
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        self.client.endpoint()
    }

    fn detect(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let (version, models) = futures::join!(
                self.client.http().probe_json("/version"),
                self.client.probe_models()
            );
            let found =
                models && version.is_some_and(|v| v.get("version").and_then(|v| v.as_str()).is_some());
            debug!("vLLM probe at {}: {}", self.endpoint(), found);
            found
        })
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelInfo>, ClassifiedError>> {
        Box::pin(self.client.list_models())
    }

    fn chat_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<String, ClassifiedError>> {
        Box::pin(async move { self.client.chat_completion(&request).await })
    }

    fn stream_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<TextStream, ClassifiedError>> {
        Box::pin(async move { self.client.stream_completion(&request).await })
    }

    fn get_capabilities(&self) -> ProviderCapabilities {
        // Continuous batching serves many requests at once
        ProviderCapabilities {
            supports_streaming: true,
            supports_json_mode: true,
            supports_model_management: false,
            supports_embeddings: false,
            max_concurrent_requests: 16,
        }
    }
}
