use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::language::Language;

/// Drives routing of every inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    #[default]
    AwaitingInitialRating,
    AwaitingCheckInRating,
    Normal,
}

impl ConversationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingInitialRating => "awaiting_initial_rating",
            Self::AwaitingCheckInRating => "awaiting_check_in_rating",
            Self::Normal => "normal",
        }
    }

    /// Stored phase strings we do not recognise route as normal chat.
    pub fn from_stored(s: &str) -> Self {
        match s {
            "awaiting_initial_rating" => Self::AwaitingInitialRating,
            "awaiting_check_in_rating" => Self::AwaitingCheckInRating,
            _ => Self::Normal,
        }
    }
}

impl fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the user produced an inbound message. Structured replies carry an
/// identifier chosen by us rather than free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A 1-10 self-reported trust score. 10 means complete trust in the voting machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRating {
    pub score: u8,
    /// `user_turn_count` when the rating was given, for correlation with `history`.
    pub message_index: u32,
    pub timestamp: DateTime<Utc>,
}

impl TrustRating {
    pub fn new(score: u8, message_index: u32) -> Self {
        Self {
            score,
            message_index,
            timestamp: Utc::now(),
        }
    }
}

/// One conversation per phone number.
///
/// `language` and `prompt_variant` are fixed at creation. `history` and
/// `feeling_array` are append-only. A non-empty `pending_ai_response` only
/// exists while (or right after) the phase is `AwaitingCheckInRating`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub phone_number: String,
    pub language: Language,
    /// Full prompt file stem, e.g. `EN_prompt_A_control_condition`.
    pub prompt_variant: String,
    pub last_message: String,
    pub history: Vec<Message>,
    pub conversation_phase: ConversationPhase,
    pub feeling_array: Vec<TrustRating>,
    pub user_turn_count: u32,
    pub intro_sent: bool,
    pub pending_ai_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(phone_number: &str, language: Language, prompt_variant: &str) -> Self {
        let now = Utc::now();
        Self {
            phone_number: phone_number.to_string(),
            language,
            prompt_variant: prompt_variant.to_string(),
            last_message: String::new(),
            history: Vec::new(),
            conversation_phase: ConversationPhase::AwaitingInitialRating,
            feeling_array: Vec::new(),
            user_turn_count: 0,
            intro_sent: false,
            pending_ai_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The last `turns` user+assistant pairs of history.
    pub fn recent_history(&self, turns: usize) -> &[Message] {
        let keep = turns * 2;
        let start = self.history.len().saturating_sub(keep);
        &self.history[start..]
    }
}
