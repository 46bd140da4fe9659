//! Durable per-phone-number conversation records.
//!
//! The state machine only talks to [`ConversationStore`]; which backend sits
//! behind it is decided once at startup.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Conversation, ConversationPhase, Language, Role};

pub mod memory;
pub mod postgres;

pub use memory::MemoryConversationStore;
pub use postgres::PgConversationStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conversation not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, phone_number: &str) -> Result<Option<Conversation>, StoreError>;

    /// Returns the existing conversation, or creates one with the given
    /// language and variant. Existing conversations keep their own.
    async fn load_or_create(
        &self,
        phone_number: &str,
        language: Language,
        prompt_variant: &str,
    ) -> Result<Conversation, StoreError>;

    async fn append_message(
        &self,
        phone_number: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    async fn append_rating(
        &self,
        phone_number: &str,
        score: u8,
        turn_index: u32,
    ) -> Result<(), StoreError>;

    /// Sets the phase, and the turn count when one is given.
    async fn set_phase(
        &self,
        phone_number: &str,
        phase: ConversationPhase,
        user_turn_count: Option<u32>,
    ) -> Result<(), StoreError>;

    async fn mark_intro_sent(&self, phone_number: &str) -> Result<(), StoreError>;

    async fn set_pending_reply(&self, phone_number: &str, reply: &str) -> Result<(), StoreError>;

    /// Returns the pending reply, if any, and clears it.
    async fn take_pending_reply(&self, phone_number: &str) -> Result<Option<String>, StoreError>;

    /// Removes the conversation. Returns whether one existed.
    async fn delete(&self, phone_number: &str) -> Result<bool, StoreError>;
}
