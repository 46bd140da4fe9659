use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{Conversation, ConversationPhase, Language, Message, Role, TrustRating};
use crate::store::{ConversationStore, StoreError};

/// Process-local store. Used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, phone_number: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Conversation) + Send,
    {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(phone_number)
            .ok_or_else(|| StoreError::NotFound(phone_number.to_string()))?;
        f(conversation);
        conversation.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get(&self, phone_number: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.read().await.get(phone_number).cloned())
    }

    async fn load_or_create(
        &self,
        phone_number: &str,
        language: Language,
        prompt_variant: &str,
    ) -> Result<Conversation, StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(phone_number.to_string())
            .or_insert_with(|| Conversation::new(phone_number, language, prompt_variant));
        Ok(conversation.clone())
    }

    async fn append_message(
        &self,
        phone_number: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        self.update(phone_number, |c| {
            c.last_message = content.to_string();
            c.history.push(Message::new(role, content));
        })
        .await
    }

    async fn append_rating(
        &self,
        phone_number: &str,
        score: u8,
        turn_index: u32,
    ) -> Result<(), StoreError> {
        self.update(phone_number, |c| {
            c.feeling_array.push(TrustRating::new(score, turn_index));
        })
        .await
    }

    async fn set_phase(
        &self,
        phone_number: &str,
        phase: ConversationPhase,
        user_turn_count: Option<u32>,
    ) -> Result<(), StoreError> {
        self.update(phone_number, |c| {
            c.conversation_phase = phase;
            if let Some(count) = user_turn_count {
                c.user_turn_count = count;
            }
        })
        .await
    }

    async fn mark_intro_sent(&self, phone_number: &str) -> Result<(), StoreError> {
        self.update(phone_number, |c| c.intro_sent = true).await
    }

    async fn set_pending_reply(&self, phone_number: &str, reply: &str) -> Result<(), StoreError> {
        self.update(phone_number, |c| {
            c.pending_ai_response = Some(reply.to_string());
        })
        .await
    }

    async fn take_pending_reply(&self, phone_number: &str) -> Result<Option<String>, StoreError> {
        let mut pending = None;
        self.update(phone_number, |c| pending = c.pending_ai_response.take())
            .await?;
        Ok(pending.filter(|p| !p.is_empty()))
    }

    async fn delete(&self, phone_number: &str) -> Result<bool, StoreError> {
        Ok(self.conversations.write().await.remove(phone_number).is_some())
    }
}
