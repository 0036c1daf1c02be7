use crate::error::ClassifiedError;
use crate::llm::types::{
    ChatRequest, ModelInfo, ProviderCapabilities, ProviderEndpoint, ProviderKind,
};
use futures::Stream;
use futures::future::BoxFuture;
use std::pin::Pin;

/// Incremental text fragments of one streaming completion, in receipt order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ClassifiedError>> + Send>>;

/// Contract every backend adapter satisfies.
///
/// Adapters translate their backend's native request/response shapes into
/// these common shapes and classify every failure before returning it.
pub trait LLMProvider: Send + Sync {
    /// Protocol variant implemented by this adapter
    fn kind(&self) -> ProviderKind;

    /// Short provider name used in logs and diagnostics
    fn provider_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Endpoint this adapter is bound to
    fn endpoint(&self) -> &ProviderEndpoint;

    /// Cheap probe telling whether the endpoint speaks this adapter's protocol.
    ///
    /// Bounded by the probe timeout and never fails: any error means `false`.
    fn detect(&self) -> BoxFuture<'_, bool>;

    /// List the models the server currently offers
    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelInfo>, ClassifiedError>>;

    /// Single-shot completion returning the whole response text
    fn chat_completion(&self, request: ChatRequest)
    -> BoxFuture<'_, Result<String, ClassifiedError>>;

    /// Streaming completion.
    ///
    /// The outer result reports failures establishing the stream; failures
    /// after the first byte arrive as `Err` items and end the stream.
    fn stream_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<TextStream, ClassifiedError>>;

    /// Static capability descriptor
    fn get_capabilities(&self) -> ProviderCapabilities;

    /// Detailed information about one model
    fn model_info(&self, model: &str) -> BoxFuture<'_, Result<ModelInfo, ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            let models = self.list_models().await?;
            models.into_iter().find(|m| m.name == model).ok_or_else(|| {
                ClassifiedError::new(
                    crate::error::ErrorCategory::ModelNotFound,
                    format!("model '{}' is not available on {}", model, self.endpoint()),
                )
            })
        })
    }

    /// Download a model onto the server
    fn pull_model(&self, _model: &str) -> BoxFuture<'_, Result<(), ClassifiedError>> {
        let error = unsupported(self.kind(), "pulling models");
        Box::pin(async move { Err(error) })
    }

    /// Remove a model from the server
    fn delete_model(&self, _model: &str) -> BoxFuture<'_, Result<(), ClassifiedError>> {
        let error = unsupported(self.kind(), "deleting models");
        Box::pin(async move { Err(error) })
    }

    /// Compute embeddings for each input
    fn embed(
        &self,
        _model: &str,
        _inputs: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Vec<f32>>, ClassifiedError>> {
        let error = unsupported(self.kind(), "embeddings");
        Box::pin(async move { Err(error) })
    }
}

fn unsupported(kind: ProviderKind, feature: &str) -> ClassifiedError {
    ClassifiedError::configuration(format!("{} does not support {}", kind.label(), feature))
        .with_suggestion(format!(
            "Use the {} server's own tools for {}, or switch to a provider that supports it.",
            kind.label(),
            feature
        ))
}
