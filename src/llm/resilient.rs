//! Retry and circuit breaking around any adapter.
//!
//! The breaker sits outside the retry loop: a call counts as one breaker
//! failure only after its whole retry budget is spent. Streams are protected
//! while being established; once the first byte arrives, failures belong to
//! the stream health monitor.

use crate::error::ClassifiedError;
use crate::llm::provider::{LLMProvider, TextStream};
use crate::llm::types::{
    ChatRequest, ModelInfo, ProviderCapabilities, ProviderEndpoint, ProviderKind,
};
use crate::recovery::{CircuitBreaker, RetryStrategy};
use futures::future::BoxFuture;
use std::sync::Arc;

pub struct ResilientProvider {
    inner: Arc<dyn LLMProvider>,
    retry: RetryStrategy,
    breaker: Arc<CircuitBreaker>,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, retry: RetryStrategy, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            inner,
            retry,
            breaker,
        }
    }

    pub fn inner(&self) -> &Arc<dyn LLMProvider> {
        &self.inner
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

impl LLMProvider for ResilientProvider {
    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        self.inner.endpoint()
    }

    fn detect(&self) -> BoxFuture<'_, bool> {
        self.inner.detect()
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelInfo>, ClassifiedError>> {
        Box::pin(async move {
            self.breaker
                .call(|| self.retry.execute_classified(|| self.inner.list_models()))
                .await
        })
    }

    fn chat_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<String, ClassifiedError>> {
        Box::pin(async move {
            self.breaker
                .call(|| {
                    self.retry
                        .execute_classified(|| self.inner.chat_completion(request.clone()))
                })
                .await
        })
    }

    fn stream_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<TextStream, ClassifiedError>> {
        Box::pin(async move {
            self.breaker
                .call(|| {
                    self.retry
                        .execute_classified(|| self.inner.stream_completion(request.clone()))
                })
                .await
        })
    }

    fn get_capabilities(&self) -> ProviderCapabilities {
        self.inner.get_capabilities()
    }

    fn model_info(&self, model: &str) -> BoxFuture<'_, Result<ModelInfo, ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            self.breaker
                .call(|| self.retry.execute_classified(|| self.inner.model_info(&model)))
                .await
        })
    }

    fn pull_model(&self, model: &str) -> BoxFuture<'_, Result<(), ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            self.breaker
                .call(|| self.retry.execute_classified(|| self.inner.pull_model(&model)))
                .await
        })
    }

    fn delete_model(&self, model: &str) -> BoxFuture<'_, Result<(), ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move { self.breaker.call(|| self.inner.delete_model(&model)).await })
    }

    fn embed(
        &self,
        model: &str,
        inputs: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Vec<f32>>, ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            self.breaker
                .call(|| {
                    self.retry
                        .execute_classified(|| self.inner.embed(&model, inputs.clone()))
                })
                .await
        })
    }
}
