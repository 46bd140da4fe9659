use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum WhatsAppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WhatsApp API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Media {0} has no download URL")]
    MissingMediaUrl(String),
}

#[derive(Debug, Clone)]
pub struct MediaDownload {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Outbound side of the messaging channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), WhatsAppError>;

    /// Sends an `interactive` object (list, button or flow message).
    async fn send_interactive(&self, to: &str, interactive: Value) -> Result<(), WhatsAppError>;

    /// Downloads media that a user sent us, such as a voice note.
    async fn fetch_media(&self, media_id: &str) -> Result<MediaDownload, WhatsAppError>;
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    url: Option<String>,
    mime_type: Option<String>,
}

/// Graph API client bound to one business phone number.
#[derive(Clone)]
pub struct WhatsAppClient {
    client: Client,
    api_base: String,
    phone_number_id: String,
    access_token: String,
}

impl WhatsAppClient {
    pub fn new(
        api_base: &str,
        phone_number_id: &str,
        access_token: &str,
    ) -> Result<Self, WhatsAppError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            phone_number_id: phone_number_id.to_string(),
            access_token: access_token.to_string(),
        })
    }

    async fn post_message(&self, payload: Value) -> Result<(), WhatsAppError> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        debug!("WhatsApp API success: {body}");
        Ok(())
    }
}

#[async_trait]
impl Messenger for WhatsAppClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), WhatsAppError> {
        debug!("Sending text message to {to}");
        self.post_message(text_message(to, text)).await
    }

    async fn send_interactive(&self, to: &str, interactive: Value) -> Result<(), WhatsAppError> {
        debug!("Sending interactive message to {to}");
        self.post_message(interactive_message(to, interactive)).await
    }

    async fn fetch_media(&self, media_id: &str) -> Result<MediaDownload, WhatsAppError> {
        let info: MediaInfo = check_status(
            self.client
                .get(format!("{}/{}", self.api_base, media_id))
                .bearer_auth(&self.access_token)
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;

        let url = info
            .url
            .ok_or_else(|| WhatsAppError::MissingMediaUrl(media_id.to_string()))?;
        let bytes = check_status(
            self.client
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await?,
        )
        .await?
        .bytes()
        .await?;

        debug!("Downloaded media {media_id} ({} bytes)", bytes.len());
        Ok(MediaDownload {
            bytes,
            mime_type: info.mime_type.unwrap_or_else(|| "audio/ogg".to_string()),
        })
    }
}

async fn check_status(response: Response) -> Result<Response, WhatsAppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    error!("WhatsApp API error {status}: {message}");
    Err(WhatsAppError::Api {
        status: status.as_u16(),
        message,
    })
}

pub fn text_message(to: &str, text: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "body": text }
    })
}

pub fn interactive_message(to: &str, interactive: Value) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": interactive
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_shape() {
        let payload = text_message("5511999990000", "hello");
        assert_eq!(payload["messaging_product"], "whatsapp");
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["to"], "5511999990000");
        assert_eq!(payload["text"]["body"], "hello");
    }

    #[test]
    fn test_interactive_message_wraps_object() {
        let payload = interactive_message("1", json!({ "type": "list" }));
        assert_eq!(payload["type"], "interactive");
        assert_eq!(payload["interactive"]["type"], "list");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = WhatsAppClient::new("https://graph.facebook.com/v22.0/", "123", "t").unwrap();
        assert_eq!(client.api_base, "https://graph.facebook.com/v22.0");
    }
}
