//! LM Studio adapter.
//!
//! Detection and model listing use LM Studio's own REST API under `/api/v0`,
//! which reports model type, load state and maximum context length. Chat goes
//! through the OpenAI-compatible endpoints.

use crate::error::ClassifiedError;
use crate::llm::openai_provider::OpenAICompatClient;
use crate::llm::provider::{LLMProvider, TextStream};
use crate::llm::types::{
    ChatRequest, ModelCapabilities, ModelInfo, ProviderCapabilities, ProviderConfig,
    ProviderEndpoint, ProviderKind,
};
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct NativeModelList {
    data: Vec<NativeModel>,
}

#[derive(Debug, Deserialize)]
struct NativeModel {
    id: String,
    #[serde(rename = "type")]
    model_type: Option<String>,
    arch: Option<String>,
    quantization: Option<String>,
    compatibility_type: Option<String>,
    state: Option<String>,
    max_context_length: Option<u64>,
}

impl From<NativeModel> for ModelInfo {
    fn from(model: NativeModel) -> Self {
        let model_type = model.model_type.as_deref().unwrap_or("llm");
        ModelInfo {
            name: model.id,
            context_window: model.max_context_length.map(|v| v.min(u32::MAX as u64) as u32),
            format_hint: model.quantization.or(model.compatibility_type),
            family: model.arch,
            size_bytes: None,
            capabilities: ModelCapabilities {
                vision: model_type == "vlm",
                embeddings: model_type == "embeddings",
                json_mode: model_type != "embeddings",
                function_calling: false,
            },
        }
    }
}

pub struct LMStudioProvider {
    client: OpenAICompatClient,
}

impl LMStudioProvider {
    pub const DEFAULT_PORT: u16 = 1234;

    pub fn new(endpoint: ProviderEndpoint, config: &ProviderConfig) -> Result<Self, ClassifiedError> {
        Ok(Self {
            client: OpenAICompatClient::new(endpoint, config)?,
        })
    }

    fn is_native_listing(value: &serde_json::Value) -> bool {
        value
            .get("data")
            .and_then(|d| d.as_array())
            .is_some_and(|models| {
                models.is_empty()
                    || models
                        .iter()
                        .any(|m| m.get("state").is_some() || m.get("max_context_length").is_some())
            })
    }
}

impl LLMProvider for LMStudioProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LmStudio
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        self.client.endpoint()
    }

    fn detect(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let found = self
                .client
                .http()
                .probe_json("/api/v0/models")
                .await
                .is_some_and(|v| Self::is_native_listing(&v));
            debug!("LM Studio probe at {}: {}", self.endpoint(), found);
            found
        })
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelInfo>, ClassifiedError>> {
        Box::pin(async move {
            let list: NativeModelList = self.client.http().get_json("/api/v0/models").await?;
            let models: Vec<ModelInfo> = list.data.into_iter().map(ModelInfo::from).collect();
            debug!("LM Studio reports {} models", models.len());
            Ok(models)
        })
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
        ProviderCapabilities {
            supports_streaming: true,
            supports_json_mode: true,
            supports_model_management: false,
            supports_embeddings: true,
            max_concurrent_requests: 1,
        }
    }

    fn embed(
        &self,
        model: &str,
        inputs: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Vec<f32>>, ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            let value: serde_json::Value = self
                .client
                .http()
                .post_json(
                    "/v1/embeddings",
                    &serde_json::json!({ "model": model, "input": inputs }),
                )
                .await?;
            let data = value
                .get("data")
                .and_then(|d| d.as_array())
                .ok_or_else(|| ClassifiedError::parse("embeddings response has no data array"))?;
            data.iter()
                .map(|entry| {
                    entry
                        .get("embedding")
                        .cloned()
                        .ok_or_else(|| ClassifiedError::parse("embedding entry has no vector"))
                        .and_then(|v| serde_json::from_value::<Vec<f32>>(v).map_err(Into::into))
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_model_conversion() {
        let model: NativeModel = serde_json::from_value(json!({
            "id": "qwen2-vl-7b-instruct",
            "object": "model",
            "type": "vlm",
            "publisher": "mlx-community",
            "arch": "qwen2_vl",
            "compatibility_type": "mlx",
            "quantization": "4bit",
            "state": "not-loaded",
            "max_context_length": 32768
        }))
        .unwrap();
        let info = ModelInfo::from(model);
        assert!(info.capabilities.vision);
        assert!(!info.capabilities.embeddings);
        assert_eq!(info.context_window, Some(32768));
        assert_eq!(info.format_hint.as_deref(), Some("4bit"));
        assert_eq!(info.family.as_deref(), Some("qwen2_vl"));
    }

    #[test]
    fn test_native_listing_shape() {
        assert!(LMStudioProvider::is_native_listing(&json!({"data": []})));
        assert!(LMStudioProvider::is_native_listing(
            &json!({"data": [{"id": "m", "state": "loaded"}]})
        ));
        // A plain /v1/models body does not carry LM Studio's fields
        assert!(!LMStudioProvider::is_native_listing(
            &json!({"data": [{"id": "m", "object": "model"}]})
        ));
        assert!(!LMStudioProvider::is_native_listing(&json!({"error": "not found"})));
    }
}
