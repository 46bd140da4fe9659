//! The conversation-phase state machine.
//!
//! | phase                    | input                  | next phase               |
//! |--------------------------|------------------------|--------------------------|
//! | awaiting_initial_rating  | intro not sent yet     | awaiting_initial_rating  |
//! | awaiting_initial_rating  | invalid rating         | awaiting_initial_rating  |
//! | awaiting_initial_rating  | valid rating           | normal (turn count 0)    |
//! | awaiting_check_in_rating | invalid rating         | awaiting_check_in_rating |
//! | awaiting_check_in_rating | valid rating           | normal                   |
//! | normal                   | any message            | normal / check-in        |
//!
//! When a normal turn lands on a check-in, the LLM reply is stored as the
//! pending reply and a rating prompt goes out instead. Answering the check-in
//! releases it.
//!
//! Dev commands (`/reset`, `/info`) are handled before any of this.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::RatingPromptMode;
use crate::conversation::locks::KeyedLocks;
use crate::conversation::{BotResponse, ConversationError};
use crate::llm_client::{ChatMessage, LlmGateway};
use crate::models::{Conversation, ConversationPhase, Language, MessageKind, Role};
use crate::prompts::{assign_variant, PromptStore};
use crate::store::ConversationStore;
use crate::trust::{parse_rating, should_trigger_check_in, trust_prompt, TrustPromptKey};

/// User+assistant pairs of history sent to the LLM with each turn.
pub const HISTORY_TURNS: usize = 5;

const RESET_CONFIRMATION: &str = "User data has been reset. Please clear your chat and restart.";
const RESET_FAILED: &str = "Error deleting data. Please contact the study team.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DevCommand {
    Reset,
    Info,
}

impl DevCommand {
    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "/reset" => Some(DevCommand::Reset),
            "/info" => Some(DevCommand::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConversationSettings {
    /// A check-in is due every this many normal turns. At least 1.
    pub check_in_interval: u32,
    /// Language for conversations created from now on.
    pub default_language: Language,
    pub rating_prompt_mode: RatingPromptMode,
}

pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    llm: Arc<dyn LlmGateway>,
    prompts: Arc<PromptStore>,
    settings: ConversationSettings,
    locks: KeyedLocks,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        llm: Arc<dyn LlmGateway>,
        prompts: Arc<PromptStore>,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            store,
            llm,
            prompts,
            settings,
            locks: KeyedLocks::new(),
        }
    }

    /// Handles one inbound message from `phone_number`.
    ///
    /// Messages from the same sender are processed one at a time. Invalid
    /// ratings are answered with a re-prompt and never touch stored state.
    pub async fn handle_incoming(
        &self,
        phone_number: &str,
        text: &str,
        kind: MessageKind,
    ) -> Result<BotResponse, ConversationError> {
        let _guard = self.locks.lock(phone_number).await;

        if let Some(command) = DevCommand::parse(text) {
            return self.handle_dev_command(phone_number, command).await;
        }

        let language = self.settings.default_language;
        let variant = assign_variant().full_name(language);
        let conversation = self
            .store
            .load_or_create(phone_number, language, &variant)
            .await?;

        match conversation.conversation_phase {
            ConversationPhase::AwaitingInitialRating => {
                self.handle_initial_rating(&conversation, text, kind).await
            }
            ConversationPhase::AwaitingCheckInRating => {
                self.handle_check_in_rating(&conversation, text, kind).await
            }
            ConversationPhase::Normal => self.handle_normal_message(&conversation, text).await,
        }
    }

    async fn handle_dev_command(
        &self,
        phone_number: &str,
        command: DevCommand,
    ) -> Result<BotResponse, ConversationError> {
        match command {
            DevCommand::Reset => match self.store.delete(phone_number).await {
                Ok(existed) => {
                    info!("Reset conversation for {phone_number} (existed: {existed})");
                    Ok(BotResponse::text(RESET_CONFIRMATION))
                }
                Err(e) => {
                    error!("Failed to delete conversation for {phone_number}: {e}");
                    Ok(BotResponse::text(RESET_FAILED))
                }
            },
            DevCommand::Info => {
                let Some(conversation) = self.store.get(phone_number).await? else {
                    return Ok(BotResponse::text("[Dev Info]\nNo conversation on record."));
                };
                let system_prompt = match self
                    .prompts
                    .get(conversation.language, &conversation.prompt_variant)
                    .await
                {
                    Ok(text) => text.to_string(),
                    Err(e) => format!("(unavailable: {e})"),
                };
                Ok(BotResponse::text(format!(
                    "[Dev Info]\n\
                     Variant: {}\n\
                     Phase: {}\n\
                     Turn count: {}\n\
                     Ratings: {}\n\n\
                     --- System Prompt ---\n{}",
                    conversation.prompt_variant,
                    conversation.conversation_phase,
                    conversation.user_turn_count,
                    conversation.feeling_array.len(),
                    system_prompt
                )))
            }
        }
    }

    async fn handle_initial_rating(
        &self,
        conversation: &Conversation,
        text: &str,
        kind: MessageKind,
    ) -> Result<BotResponse, ConversationError> {
        let phone = conversation.phone_number.as_str();
        let language = conversation.language;

        // First message ever: send the intro and ignore the content.
        if !conversation.intro_sent {
            self.store.mark_intro_sent(phone).await?;
            return Ok(BotResponse::rating_prompt(language, TrustPromptKey::Intro));
        }

        let Some(score) = parse_rating(text, kind) else {
            return Ok(self.re_prompt(language, TrustPromptKey::Intro));
        };

        self.store.append_rating(phone, score, 0).await?;
        self.store
            .set_phase(phone, ConversationPhase::Normal, Some(0))
            .await?;
        info!("Initial rating {score} recorded for {phone}");

        Ok(BotResponse::text(self.prompt_text(
            language,
            TrustPromptKey::RatingReceived,
        )))
    }

    async fn handle_check_in_rating(
        &self,
        conversation: &Conversation,
        text: &str,
        kind: MessageKind,
    ) -> Result<BotResponse, ConversationError> {
        let phone = conversation.phone_number.as_str();

        let Some(score) = parse_rating(text, kind) else {
            return Ok(self.re_prompt(conversation.language, TrustPromptKey::CheckIn));
        };

        self.store
            .append_rating(phone, score, conversation.user_turn_count)
            .await?;
        self.store
            .set_phase(phone, ConversationPhase::Normal, None)
            .await?;
        let pending = self.store.take_pending_reply(phone).await?;
        info!(
            "Check-in rating {score} recorded for {phone} at turn {}",
            conversation.user_turn_count
        );

        Ok(BotResponse {
            text_messages: pending.into_iter().collect(),
            rating_prompt: None,
        })
    }

    async fn handle_normal_message(
        &self,
        conversation: &Conversation,
        text: &str,
    ) -> Result<BotResponse, ConversationError> {
        let phone = conversation.phone_number.as_str();
        let new_turn_count = conversation.user_turn_count + 1;

        let system_prompt = self
            .prompts
            .get(conversation.language, &conversation.prompt_variant)
            .await?;

        let mut messages: Vec<ChatMessage> = conversation
            .recent_history(HISTORY_TURNS)
            .iter()
            .map(|m| ChatMessage::new(m.role, m.content.clone()))
            .collect();
        messages.push(ChatMessage::new(Role::User, text));

        let reply = self.llm.complete(&system_prompt, &messages).await?;

        self.store.append_message(phone, Role::User, text).await?;
        self.store
            .append_message(phone, Role::Assistant, &reply)
            .await?;

        if should_trigger_check_in(new_turn_count, self.settings.check_in_interval) {
            self.store.set_pending_reply(phone, &reply).await?;
            self.store
                .set_phase(
                    phone,
                    ConversationPhase::AwaitingCheckInRating,
                    Some(new_turn_count),
                )
                .await?;
            info!("Check-in due for {phone} at turn {new_turn_count}; reply withheld");
            return Ok(BotResponse::rating_prompt(
                conversation.language,
                TrustPromptKey::CheckIn,
            ));
        }

        self.store
            .set_phase(phone, ConversationPhase::Normal, Some(new_turn_count))
            .await?;
        Ok(BotResponse::text(reply))
    }

    fn re_prompt(&self, language: Language, key: TrustPromptKey) -> BotResponse {
        BotResponse::rating_prompt(language, key)
            .with_text(self.prompt_text(language, TrustPromptKey::Invalid))
    }

    fn prompt_text(&self, language: Language, key: TrustPromptKey) -> String {
        trust_prompt(language, key, self.settings.rating_prompt_mode)
    }
}
