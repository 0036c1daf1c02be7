//! The OpenAI-style `/v1` protocol.
//!
//! [`OpenAICompatClient`] carries the request/response translation and is
//! shared by the LM Studio and vLLM adapters; [`OpenAICompatibleProvider`] is
//! the generic adapter for any other server exposing `/v1/chat/completions`.

use crate::error::{ClassifiedError, classify_message, extract_error_message};
use crate::llm::framing::{Frame, SseDecoder, decode_frames};
use crate::llm::http::HttpTransport;
use crate::llm::provider::{LLMProvider, TextStream};
use crate::llm::types::{
    ChatRequest, ModelCapabilities, ModelInfo, ProviderCapabilities, ProviderConfig,
    ProviderEndpoint, ProviderKind,
};
use futures::StreamExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<serde_json::Value>,
}

/// Request/response translation for the `/v1` API, bound to one endpoint.
#[derive(Debug, Clone)]
pub struct OpenAICompatClient {
    http: HttpTransport,
}

impl OpenAICompatClient {
    pub fn new(endpoint: ProviderEndpoint, config: &ProviderConfig) -> Result<Self, ClassifiedError> {
        Ok(Self {
            http: HttpTransport::new(endpoint, config)?,
        })
    }

    pub fn http(&self) -> &HttpTransport {
        &self.http
    }

    pub fn endpoint(&self) -> &ProviderEndpoint {
        self.http.endpoint()
    }

    /// True when `GET /v1/models` answers with a `data` array.
    pub async fn probe_models(&self) -> bool {
        self.http
            .probe_json("/v1/models")
            .await
            .is_some_and(|v| v.get("data").is_some_and(|d| d.is_array()))
    }

    /// Raw entries of `GET /v1/models`, for adapters that read extra fields.
    pub async fn model_entries(&self) -> Result<Vec<serde_json::Value>, ClassifiedError> {
        let list: ModelList = self.http.get_json("/v1/models").await?;
        Ok(list.data)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ClassifiedError> {
        let entries = self.model_entries().await?;
        Ok(entries.iter().filter_map(model_from_entry).collect())
    }

    fn body(request: &ChatRequest, stream: bool) -> CompletionBody<'_> {
        CompletionBody {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream,
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            stop: &request.options.stop,
            response_format: request
                .options
                .json_mode
                .then(|| json!({ "type": "json_object" })),
        }
    }

    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<String, ClassifiedError> {
        let body = Self::body(request, false);
        let value: serde_json::Value = self.http.post_json("/v1/chat/completions", &body).await?;
        if let Some(error) = value.get("error") {
            return Err(classify_message(&error_text(error)));
        }
        value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ClassifiedError::parse("completion response has no choices[0].message.content"))
    }

    pub async fn stream_completion(&self, request: &ChatRequest) -> Result<TextStream, ClassifiedError> {
        let body = Self::body(request, true);
        let response = self.http.post_stream("/v1/chat/completions", &body).await?;
        let mut frames = decode_frames(response.bytes_stream(), SseDecoder::new());

        let stream = async_stream::stream! {
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(Frame::Data(data)) => match parse_delta(&data) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    },
                    Ok(Frame::Done) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream) as TextStream)
    }
}

fn error_text(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(s) => s.clone(),
        other => extract_error_message(&json!({ "error": other }).to_string())
            .unwrap_or_else(|| other.to_string()),
    }
}

/// Extracts `choices[0].delta.content` from one SSE data frame.
///
/// Frames without content (role announcements, finish markers) yield `None`;
/// an `{"error": ...}` frame is classified.
fn parse_delta(data: &str) -> Result<Option<String>, ClassifiedError> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    if let Some(error) = value.get("error") {
        return Err(classify_message(&error_text(error)));
    }
    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string))
}

/// Builds [`ModelInfo`] from a `/v1/models` entry, reading the context length
/// under whichever key the server uses.
pub fn model_from_entry(entry: &serde_json::Value) -> Option<ModelInfo> {
    let name = entry.get("id")?.as_str()?;
    let mut info = ModelInfo::named(name);
    info.context_window = ["context_length", "max_model_len", "context_window"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(|v| v.as_u64()))
        .map(|v| v.min(u32::MAX as u64) as u32);
    info.family = entry
        .get("owned_by")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let lower = name.to_lowercase();
    info.capabilities = ModelCapabilities {
        vision: lower.contains("vision") || lower.contains("-vl"),
        embeddings: lower.contains("embed"),
        json_mode: true,
        function_calling: false,
    };
    Some(info)
}

/// Generic adapter for servers that only expose the OpenAI-style API
/// (text-generation-webui, KoboldCpp, llama.cpp server, ...).
pub struct OpenAICompatibleProvider {
    client: OpenAICompatClient,
}

impl OpenAICompatibleProvider {
    pub fn new(endpoint: ProviderEndpoint, config: &ProviderConfig) -> Result<Self, ClassifiedError> {
        Ok(Self {
            client: OpenAICompatClient::new(endpoint, config)?,
        })
    }
}

impl LLMProvider for OpenAICompatibleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompatible
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        self.client.endpoint()
    }

    fn detect(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let found = self.client.probe_models().await;
            debug!("OpenAI-compatible probe at {}: {}", self.endpoint(), found);
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
        ProviderCapabilities {
            supports_streaming: true,
            supports_json_mode: true,
            supports_model_management: false,
            supports_embeddings: false,
            max_concurrent_requests: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::llm::types::{ChatMessage, GenerationOptions};

    #[test]
    fn test_body_json_mode_and_omitted_options() {
        let plain = ChatRequest::new("m", vec![ChatMessage::user("hi")]);
        let body = serde_json::to_value(OpenAICompatClient::body(&plain, false)).unwrap();
        assert!(body.get("response_format").is_none());
        assert!(body.get("temperature").is_none());
        assert!(body.get("stop").is_none());

        let json_request = plain.with_options(GenerationOptions {
            json_mode: true,
            max_tokens: Some(10),
            ..Default::default()
        });
        let body = serde_json::to_value(OpenAICompatClient::body(&json_request, true)).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 10);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_parse_delta() {
        assert_eq!(
            parse_delta(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).unwrap(),
            Some("Hel".to_string())
        );
        assert_eq!(
            parse_delta(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
        let err = parse_delta(r#"{"error":{"message":"This model's maximum context length is 4096 tokens"}}"#)
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::ContextLength);
        assert_eq!(
            parse_delta("not json").unwrap_err().category,
            ErrorCategory::ParseError
        );
    }

    #[test]
    fn test_model_from_entry_context_keys() {
        let vllm = json!({"id": "Qwen/Qwen2.5-7B", "owned_by": "vllm", "max_model_len": 32768});
        let info = model_from_entry(&vllm).unwrap();
        assert_eq!(info.context_window, Some(32768));
        assert_eq!(info.family.as_deref(), Some("vllm"));

        let bare = json!({"id": "local-model"});
        assert_eq!(model_from_entry(&bare).unwrap().context_window, None);
        assert!(model_from_entry(&json!({"object": "model"})).is_none());
    }
}
