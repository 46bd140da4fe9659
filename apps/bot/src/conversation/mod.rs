//! Conversation flow: decides the reply to every inbound message.
//!
//! Flow: webhook → `pipeline::process_notification` → `ConversationService` →
//! store / LLM gateway → `BotResponse` → delivery.

pub mod locks;
pub mod machine;
pub mod pipeline;
pub mod response;

use thiserror::Error;

use crate::llm_client::LlmError;
use crate::prompts::PromptError;
use crate::store::StoreError;

pub use machine::{ConversationService, ConversationSettings};
pub use response::{BotResponse, RatingPrompt};

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),
}
