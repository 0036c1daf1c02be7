//! Hugging Face text-generation-inference adapter using the native
//! `/info`, `/generate` and `/generate_stream` endpoints.
//!
//! TGI serves exactly one model, so the message list is rendered into a single
//! role-labelled prompt.

use crate::error::{ClassifiedError, classify_message};
use crate::llm::framing::{Frame, SseDecoder, decode_frames};
use crate::llm::http::HttpTransport;
use crate::llm::provider::{LLMProvider, TextStream};
use crate::llm::types::{
    ChatMessage, ChatRequest, MessageRole, ModelCapabilities, ModelInfo, ProviderCapabilities,
    ProviderConfig, ProviderEndpoint, ProviderKind,
};
use futures::StreamExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TgiInfo {
    model_id: String,
    max_total_tokens: Option<u64>,
    quantize: Option<String>,
    model_dtype: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateBody {
    inputs: String,
    parameters: GenerateParameters,
}

#[derive(Debug, Serialize)]
struct GenerateParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_new_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    return_full_text: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grammar: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    token: Option<StreamToken>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamToken {
    text: String,
    #[serde(default)]
    special: bool,
}

pub struct TGIProvider {
    http: HttpTransport,
}

impl TGIProvider {
    pub const DEFAULT_PORT: u16 = 8080;

    pub fn new(endpoint: ProviderEndpoint, config: &ProviderConfig) -> Result<Self, ClassifiedError> {
        Ok(Self {
            http: HttpTransport::new(endpoint, config)?,
        })
    }

    /// Renders the conversation as a transcript ending with an open
    /// assistant turn.
    pub fn render_prompt(messages: &[ChatMessage]) -> String {
        let mut prompt = String::new();
        for message in messages {
            let label = match message.role {
                MessageRole::System => "System",
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            prompt.push_str(label);
            prompt.push_str(": ");
            prompt.push_str(message.content.trim_end());
            prompt.push_str("\n\n");
        }
        prompt.push_str("Assistant:");
        prompt
    }

    fn body(request: &ChatRequest) -> GenerateBody {
        let options = &request.options;
        GenerateBody {
            inputs: Self::render_prompt(&request.messages),
            parameters: GenerateParameters {
                max_new_tokens: options.max_tokens,
                // TGI rejects a temperature of zero
                temperature: options.temperature.filter(|t| *t > 0.0),
                return_full_text: false,
                stop: options.stop.clone(),
                grammar: options.json_mode.then(|| json!({ "type": "json", "value": {} })),
            },
        }
    }

    fn parse_event(data: &str) -> Result<Option<String>, ClassifiedError> {
        let event: StreamEvent = serde_json::from_str(data)?;
        if let Some(error) = event.error {
            return Err(classify_message(&error));
        }
        Ok(event
            .token
            .filter(|t| !t.special && !t.text.is_empty())
            .map(|t| t.text))
    }
}

impl LLMProvider for TGIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tgi
    }

    fn endpoint(&self) -> &ProviderEndpoint {
        self.http.endpoint()
    }

    fn detect(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let found = self
                .http
                .probe_json("/info")
                .await
                .is_some_and(|v| v.get("model_id").and_then(|m| m.as_str()).is_some());
            debug!("TGI probe at {}: {}", self.endpoint(), found);
            found
        })
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelInfo>, ClassifiedError>> {
        Box::pin(async move {
            let info: TgiInfo = self.http.get_json("/info").await?;
            Ok(vec![ModelInfo {
                name: info.model_id,
                context_window: info.max_total_tokens.map(|v| v.min(u32::MAX as u64) as u32),
                format_hint: info.quantize.or(info.model_dtype),
                family: None,
                size_bytes: None,
                capabilities: ModelCapabilities {
                    vision: false,
                    embeddings: false,
                    json_mode: true,
                    function_calling: false,
                },
            }])
        })
    }

    fn chat_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<String, ClassifiedError>> {
        Box::pin(async move {
            let value: serde_json::Value = self.http.post_json("/generate", &Self::body(&request)).await?;
            if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
                return Err(classify_message(error));
            }
            value
                .get("generated_text")
                .and_then(|t| t.as_str())
                .map(str::to_string)
                .ok_or_else(|| ClassifiedError::parse("TGI response has no generated_text"))
        })
    }

    fn stream_completion(
        &self,
        request: ChatRequest,
    ) -> BoxFuture<'_, Result<TextStream, ClassifiedError>> {
        Box::pin(async move {
            let response = self
                .http
                .post_stream("/generate_stream", &Self::body(&request))
                .await?;
            let mut frames = decode_frames(response.bytes_stream(), SseDecoder::new());

            let stream = async_stream::stream! {
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(Frame::Data(data)) => match Self::parse_event(&data) {
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
        })
    }

    fn get_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
            supports_json_mode: true,
            supports_model_management: false,
            supports_embeddings: false,
            max_concurrent_requests: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::llm::types::GenerationOptions;

    #[test]
    fn test_render_prompt() {
        let prompt = TGIProvider::render_prompt(&[
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hi\n"),
        ]);
        assert_eq!(prompt, "System: Be brief.\n\nUser: Hi\n\nAssistant:");
    }

    #[test]
    fn test_body_parameters() {
        let request = ChatRequest::new("ignored", vec![ChatMessage::user("x")]).with_options(
            GenerationOptions {
                temperature: Some(0.0),
                max_tokens: Some(32),
                json_mode: true,
                stop: Vec::new(),
            },
        );
        let body = serde_json::to_value(TGIProvider::body(&request)).unwrap();
        let params = &body["parameters"];
        assert_eq!(params["return_full_text"], false);
        assert_eq!(params["max_new_tokens"], 32);
        assert!(params.get("temperature").is_none());
        assert!(params.get("stop").is_none());
        assert_eq!(params["grammar"]["type"], "json");
    }

    #[test]
    fn test_parse_event_skips_special_tokens() {
        assert_eq!(
            TGIProvider::parse_event(r#"{"token":{"id":1,"text":"Hi","special":false}}"#).unwrap(),
            Some("Hi".to_string())
        );
        assert_eq!(
            TGIProvider::parse_event(r#"{"token":{"id":2,"text":"</s>","special":true}}"#).unwrap(),
            None
        );
        let err = TGIProvider::parse_event(
            r#"{"error":"Input validation error: `inputs` tokens + `max_new_tokens` must be <= 4096","error_type":"validation"}"#,
        )
        .unwrap_err();
        assert_eq!(err.category, ErrorCategory::ContextLength);
    }
}
