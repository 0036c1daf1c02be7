//! Ollama adapter speaking the native tag-based JSON API.
//!
//! | Operation | Request |
//! |---|---|
//! | detect | `GET /api/version` |
//! | list models | `GET /api/tags` |
//! | model info | `POST /api/show` |
//! | chat | `POST /api/chat` with `stream: false` |
//! | stream | `POST /api/chat` with `stream: true`, newline-delimited JSON |
//! | pull / delete | `POST /api/pull`, `DELETE /api/delete` |
//! | embeddings | `POST /api/embed` |

use crate::error::{ClassifiedError, classify_message};
use crate::llm::framing::{Frame, NdjsonDecoder, decode_frames};
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
use tracing::{debug, info};

pub struct OllamaProvider {
    http: HttpTransport,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatChunk {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    size: Option<u64>,
    #[serde(default)]
    details: OllamaModelDetails,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaModelDetails {
    format: Option<String>,
    family: Option<String>,
    families: Option<Vec<String>>,
    quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    details: OllamaModelDetails,
    #[serde(default)]
    model_info: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaProvider {
    pub const DEFAULT_PORT: u16 = 11434;

    pub fn new(endpoint: ProviderEndpoint, config: &ProviderConfig) -> Result<Self, ClassifiedError> {
        Ok(Self {
            http: HttpTransport::new(endpoint, config)?,
        })
    }

    fn chat_body(request: &ChatRequest, stream: bool) -> OllamaChatRequest<'_> {
        let mut options = serde_json::Map::new();
        if let Some(temperature) = request.options.temperature {
            options.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.options.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }
        if !request.options.stop.is_empty() {
            options.insert("stop".to_string(), json!(request.options.stop));
        }

        OllamaChatRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream,
            format: request.options.json_mode.then_some("json"),
            options,
        }
    }

    fn convert_model(model: OllamaModel) -> ModelInfo {
        let families = model.details.families.clone().unwrap_or_default();
        let lower_name = model.name.to_lowercase();
        ModelInfo {
            capabilities: ModelCapabilities {
                vision: families.iter().any(|f| f == "clip" || f == "mllama"),
                embeddings: lower_name.contains("embed"),
                json_mode: true,
                function_calling: false,
            },
            name: model.name,
            context_window: None,
            format_hint: model
                .details
                .quantization_level
                .or(model.details.format),
            family: model.details.family,
            size_bytes: model.size,
        }
    }

    /// The context length key is architecture-prefixed, e.g. `llama.context_length`.
    fn context_length(model_info: &serde_json::Map<String, serde_json::Value>) -> Option<u32> {
        model_info
            .iter()
            .find(|(key, _)| key.ends_with(".context_length"))
            .and_then(|(_, value)| value.as_u64())
            .map(|v| v.min(u32::MAX as u64) as u32)
    }

    fn parse_chunk(line: &str) -> Result<OllamaChatChunk, ClassifiedError> {
        let chunk: OllamaChatChunk = serde_json::from_str(line)?;
        match chunk.error {
            Some(error) => Err(classify_message(&error)),
            None => Ok(chunk),
        }
    }
}

impl LLMProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        self.http.endpoint()
    }

    fn detect(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let found = self
                .http
                .probe_json("/api/version")
                .await
                .is_some_and(|v| v.get("version").and_then(|v| v.as_str()).is_some());
            debug!("Ollama probe at {}: {}", self.endpoint(), found);
            found
        })
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelInfo>, ClassifiedError>> {
        Box::pin(async move {
            let tags: TagsResponse = self.http.get_json("/api/tags").await?;
            Ok(tags.models.into_iter().map(Self::convert_model).collect())
        })
    }

    fn chat_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<String, ClassifiedError>> {
        Box::pin(async move {
            let body = Self::chat_body(&request, false);
            let value: serde_json::Value = self.http.post_json("/api/chat", &body).await?;
            if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
                return Err(classify_message(error));
            }
            value
                .pointer("/message/content")
                .and_then(|c| c.as_str())
                .map(str::to_string)
                .ok_or_else(|| ClassifiedError::parse("Ollama response has no message content"))
        })
    }

    fn stream_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<TextStream, ClassifiedError>> {
        Box::pin(async move {
            let body = Self::chat_body(&request, true);
            let response = self.http.post_stream("/api/chat", &body).await?;
            let mut frames = decode_frames(response.bytes_stream(), NdjsonDecoder::new());

            let stream = async_stream::stream! {
                while let Some(frame) = frames.next().await {
                    let line = match frame {
                        Ok(Frame::Data(line)) => line,
                        Ok(Frame::Done) => break,
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    };
                    match Self::parse_chunk(&line) {
                        Ok(chunk) => {
                            if let Some(message) = chunk.message
                                && !message.content.is_empty()
                            {
                                yield Ok(message.content);
                            }
                            if chunk.done {
                                break;
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }
            };
            Ok(Box::pin(stream) as TextStream)
        })
    }

    fn get_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
            supports_json_mode: true,
            supports_model_management: true,
            supports_embeddings: true,
            max_concurrent_requests: 1,
        }
    }

    fn model_info(&self, model: &str) -> BoxFuture<'_, Result<ModelInfo, ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            let show: ShowResponse = self
                .http
                .post_json("/api/show", &json!({ "model": model }))
                .await?;
            let has = |cap: &str| show.capabilities.iter().any(|c| c == cap);
            Ok(ModelInfo {
                context_window: Self::context_length(&show.model_info),
                format_hint: show
                    .details
                    .quantization_level
                    .clone()
                    .or(show.details.format.clone()),
                family: show.details.family.clone(),
                size_bytes: None,
                capabilities: ModelCapabilities {
                    vision: has("vision"),
                    embeddings: has("embedding"),
                    json_mode: has("completion"),
                    function_calling: has("tools"),
                },
                name: model,
            })
        })
    }

    fn pull_model(&self, model: &str) -> BoxFuture<'_, Result<(), ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            info!("Pulling model {} on {}", model, self.endpoint());
            let value: serde_json::Value = self
                .http
                .post_json("/api/pull", &json!({ "model": model, "stream": false }))
                .await?;
            match value.get("error").and_then(|e| e.as_str()) {
                Some(error) => Err(classify_message(error)),
                None => Ok(()),
            }
        })
    }

    fn delete_model(&self, model: &str) -> BoxFuture<'_, Result<(), ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            info!("Deleting model {} on {}", model, self.endpoint());
            self.http
                .delete_json("/api/delete", &json!({ "model": model }))
                .await
        })
    }

    fn embed(
        &self,
        model: &str,
        inputs: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Vec<f32>>, ClassifiedError>> {
        let model = model.to_string();
        Box::pin(async move {
            let response: EmbedResponse = self
                .http
                .post_json("/api/embed", &json!({ "model": model, "input": inputs }))
                .await?;
            Ok(response.embeddings)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ChatMessage, GenerationOptions};

    #[test]
    fn test_chat_body_maps_options() {
        let request = ChatRequest::new("llama3", vec![ChatMessage::user("hi")]).with_options(
            GenerationOptions {
                temperature: Some(0.2),
                max_tokens: Some(64),
                json_mode: true,
                stop: vec!["</s>".to_string()],
            },
        );
        let body = serde_json::to_value(OllamaProvider::chat_body(&request, true)).unwrap();
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 64);
        assert_eq!(body["options"]["stop"][0], "</s>");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_context_length_lookup() {
        let info: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"general.architecture":"qwen2","qwen2.context_length":32768}"#)
                .unwrap();
        assert_eq!(OllamaProvider::context_length(&info), Some(32768));
    }

    #[test]
    fn test_stream_error_line_is_classified() {
        let err = OllamaProvider::parse_chunk(r#"{"error":"model 'nope' not found, try pulling it first"}"#)
            .unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::ModelNotFound);
    }
}
