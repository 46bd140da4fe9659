use crate::models::Language;
use crate::trust::TrustPromptKey;

/// Instruction to send a rating prompt, rendered by the delivery layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingPrompt {
    pub language: Language,
    pub key: TrustPromptKey,
}

/// What to send back for one inbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BotResponse {
    /// Plain messages, sent in order before any rating prompt.
    pub text_messages: Vec<String>,
    pub rating_prompt: Option<RatingPrompt>,
}

impl BotResponse {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            text_messages: vec![message.into()],
            rating_prompt: None,
        }
    }

    pub fn rating_prompt(language: Language, key: TrustPromptKey) -> Self {
        Self {
            text_messages: Vec::new(),
            rating_prompt: Some(RatingPrompt { language, key }),
        }
    }

    pub fn with_text(mut self, message: impl Into<String>) -> Self {
        self.text_messages.push(message.into());
        self
    }
}
