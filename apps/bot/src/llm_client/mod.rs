/// LLM Client: the single point of entry for all OpenAI API calls.
///
/// No other module may call the OpenAI API directly. Chat replies and voice
/// transcription both go through [`LlmGateway`], which the conversation layer
/// holds as a trait object.
///
/// Model: gpt-4 (hardcoded so every study participant talks to the same model)
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Role;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
/// The chat model used for every conversation.
pub const MODEL: &str = "gpt-4";
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";
const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Turns conversation context into text. Implemented by [`OpenAiClient`] and
/// by test doubles.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Generates the assistant's next reply.
    async fn complete(&self, system_prompt: &str, messages: &[ChatMessage])
        -> Result<String, LlmError>;

    /// Transcribes a voice note to text.
    async fn transcribe(&self, audio: Bytes, mime_type: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if it has any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

/// Wraps the OpenAI chat completions and audio transcription APIs with retry
/// logic.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    /// Sends the request built by `build`, retrying on 429 (rate limit) and
    /// 5xx errors with exponential backoff.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, LlmError>
    where
        F: Fn() -> Result<RequestBuilder, LlmError> + Send + Sync,
    {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build()?.bearer_auth(&self.api_key).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: api_error_message(body),
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl LlmGateway for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let request_body = build_chat_request(system_prompt, messages);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .send_with_retry(|| Ok(self.client.post(&url).json(&request_body)))
            .await?;
        let completion: ChatCompletionResponse = serde_json::from_str(&response.text().await?)?;

        if let Some(usage) = &completion.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        completion
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }

    async fn transcribe(&self, audio: Bytes, mime_type: &str) -> Result<String, LlmError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let file_name = format!("voice.{}", audio_extension(mime_type));

        let response = self
            .send_with_retry(|| {
                let part = Part::stream(audio.clone())
                    .file_name(file_name.clone())
                    .mime_str(base_mime(mime_type))?;
                let form = Form::new()
                    .text("model", TRANSCRIPTION_MODEL)
                    .part("file", part);
                Ok(self.client.post(&url).multipart(form))
            })
            .await?;
        let transcription: TranscriptionResponse = serde_json::from_str(&response.text().await?)?;

        let text = transcription.text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        debug!("Transcribed {} bytes of audio", audio.len());
        Ok(text.to_string())
    }
}

/// System prompt first, then the conversation in order.
fn build_chat_request<'a>(
    system_prompt: &'a str,
    messages: &'a [ChatMessage],
) -> ChatCompletionRequest<'a> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    wire.push(OpenAiMessage {
        role: "system",
        content: system_prompt,
    });
    wire.extend(messages.iter().map(|m| OpenAiMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));
    ChatCompletionRequest {
        model: MODEL,
        messages: wire,
    }
}

fn api_error_message(body: String) -> String {
    serde_json::from_str::<OpenAiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// `audio/ogg; codecs=opus` -> `audio/ogg`
fn base_mime(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

/// File extension the transcription API uses to detect the audio format.
fn audio_extension(mime_type: &str) -> &'static str {
    match base_mime(mime_type) {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" => "webm",
        "audio/aac" => "aac",
        _ => "ogg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_puts_system_prompt_first() {
        let messages = vec![
            ChatMessage::new(Role::User, "hi"),
            ChatMessage::new(Role::Assistant, "hello"),
            ChatMessage::new(Role::User, "how do audits work?"),
        ];
        let request = build_chat_request("be neutral", &messages);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], MODEL);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be neutral");
        assert_eq!(json["messages"][2]["role"], "assistant");
        assert_eq!(json["messages"][3]["content"], "how do audits work?");
        assert_eq!(json["messages"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_response_text_takes_first_choice() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), Some("Hello!"));
    }

    #[test]
    fn test_response_without_content_has_no_text() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let response: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), None);

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn test_api_error_message_extracts_message() {
        let body = r#"{"error": {"message": "Invalid API key", "type": "invalid_request_error"}}"#;
        assert_eq!(api_error_message(body.to_string()), "Invalid API key");
        assert_eq!(api_error_message("plain failure".to_string()), "plain failure");
    }

    #[test]
    fn test_audio_extension_from_whatsapp_mime() {
        assert_eq!(audio_extension("audio/ogg; codecs=opus"), "ogg");
        assert_eq!(audio_extension("audio/mpeg"), "mp3");
        assert_eq!(audio_extension("audio/mp4"), "m4a");
        assert_eq!(audio_extension("application/octet-stream"), "ogg");
        assert_eq!(base_mime("audio/ogg; codecs=opus"), "audio/ogg");
    }
}
