//! Renders a [`BotResponse`] onto the channel.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::RatingPromptMode;
use crate::conversation::{BotResponse, RatingPrompt};
use crate::models::Language;
use crate::trust::catalog::{flow_cta, scale_labels, selector_button_label, trust_prompt};
use crate::trust::rating::{structured_reply_id, MAX_SCORE, MIN_SCORE};
use crate::whatsapp::client::{Messenger, WhatsAppError};

/// Screen the rating flow opens on.
const FLOW_START_SCREEN: &str = "QUESTION_ONE";

#[derive(Clone)]
pub struct Delivery {
    messenger: Arc<dyn Messenger>,
    mode: RatingPromptMode,
    flow_id: Option<String>,
}

impl Delivery {
    pub fn new(messenger: Arc<dyn Messenger>, mode: RatingPromptMode, flow_id: Option<String>) -> Self {
        Self {
            messenger,
            mode,
            flow_id,
        }
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    /// Sends text messages in order, then the rating prompt if one is requested.
    pub async fn deliver(&self, to: &str, response: &BotResponse) -> Result<(), WhatsAppError> {
        for text in &response.text_messages {
            self.messenger.send_text(to, text).await?;
        }
        if let Some(prompt) = &response.rating_prompt {
            self.send_rating_prompt(to, prompt).await?;
        }
        Ok(())
    }

    async fn send_rating_prompt(&self, to: &str, prompt: &RatingPrompt) -> Result<(), WhatsAppError> {
        let body = trust_prompt(prompt.language, prompt.key, self.mode);
        match (self.mode, self.flow_id.as_deref()) {
            (RatingPromptMode::Text, _) => self.messenger.send_text(to, &body).await,
            (RatingPromptMode::List, _) => {
                self.messenger
                    .send_interactive(to, rating_list(prompt.language, &body))
                    .await
            }
            (RatingPromptMode::Flow, Some(flow_id)) => {
                self.messenger
                    .send_interactive(to, rating_flow(prompt.language, &body, flow_id))
                    .await
            }
            // Config refuses flow mode without a flow id; degrade to a list if it happens anyway.
            (RatingPromptMode::Flow, None) => {
                self.messenger
                    .send_interactive(to, rating_list(prompt.language, &body))
                    .await
            }
        }
    }
}

/// Interactive list with one row per score, identified as `rating_<n>`.
pub fn rating_list(language: Language, body: &str) -> Value {
    let (low, high) = scale_labels(language);
    let rows: Vec<Value> = (MIN_SCORE..=MAX_SCORE)
        .map(|score| {
            let mut row = json!({
                "id": structured_reply_id(score),
                "title": score.to_string(),
            });
            if score == MIN_SCORE {
                row["description"] = json!(low);
            } else if score == MAX_SCORE {
                row["description"] = json!(high);
            }
            row
        })
        .collect();

    json!({
        "type": "list",
        "body": { "text": body },
        "action": {
            "button": selector_button_label(language),
            "sections": [{ "title": "1-10", "rows": rows }]
        }
    })
}

pub fn rating_flow(language: Language, body: &str, flow_id: &str) -> Value {
    json!({
        "type": "flow",
        "body": { "text": body },
        "action": {
            "name": "flow",
            "parameters": {
                "flow_message_version": "3",
                "flow_id": flow_id,
                "flow_cta": flow_cta(language),
                "flow_action": "navigate",
                "flow_action_payload": { "screen": FLOW_START_SCREEN }
            }
        }
    })
}
