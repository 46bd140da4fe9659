use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;

use crate::models::{Conversation, ConversationPhase, Language, Message, Role, TrustRating};
use crate::store::{ConversationStore, StoreError};

/// One row per phone number. `history` and `feeling_array` are JSONB arrays
/// that are only ever appended to.
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    phone_number: String,
    language: String,
    prompt_variant: String,
    last_message: String,
    history: Json<Vec<Message>>,
    conversation_phase: String,
    feeling_array: Json<Vec<TrustRating>>,
    user_turn_count: i32,
    intro_sent: bool,
    pending_ai_response: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            phone_number: row.phone_number,
            language: Language::from_code_or_default(&row.language),
            prompt_variant: row.prompt_variant,
            last_message: row.last_message,
            history: row.history.0,
            conversation_phase: ConversationPhase::from_stored(&row.conversation_phase),
            feeling_array: row.feeling_array.0,
            user_turn_count: u32::try_from(row.user_turn_count).unwrap_or(0),
            intro_sent: row.intro_sent,
            pending_ai_response: row.pending_ai_response.filter(|p| !p.is_empty()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_CONVERSATION: &str = r#"
    SELECT phone_number, language, prompt_variant, last_message, history,
           conversation_phase, feeling_array, user_turn_count, intro_sent,
           pending_ai_response, created_at, updated_at
    FROM conversations
    WHERE phone_number = $1
"#;

fn expect_row(rows_affected: u64, phone_number: &str) -> Result<(), StoreError> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(phone_number.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn get(&self, phone_number: &str) -> Result<Option<Conversation>, StoreError> {
        let row: Option<ConversationRow> = sqlx::query_as(SELECT_CONVERSATION)
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Conversation::from))
    }

    async fn load_or_create(
        &self,
        phone_number: &str,
        language: Language,
        prompt_variant: &str,
    ) -> Result<Conversation, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (phone_number, language, prompt_variant, conversation_phase)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (phone_number) DO NOTHING
            "#,
        )
        .bind(phone_number)
        .bind(language.code())
        .bind(prompt_variant)
        .bind(ConversationPhase::AwaitingInitialRating.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            info!("Created conversation for {phone_number} with variant {prompt_variant}");
        }

        self.get(phone_number)
            .await?
            .ok_or_else(|| StoreError::NotFound(phone_number.to_string()))
    }

    async fn append_message(
        &self,
        phone_number: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let message = Message::new(role, content);
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET history = history || $2, last_message = $3, updated_at = now()
            WHERE phone_number = $1
            "#,
        )
        .bind(phone_number)
        .bind(Json(vec![message]))
        .bind(content)
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), phone_number)
    }

    async fn append_rating(
        &self,
        phone_number: &str,
        score: u8,
        turn_index: u32,
    ) -> Result<(), StoreError> {
        let rating = TrustRating::new(score, turn_index);
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET feeling_array = feeling_array || $2, updated_at = now()
            WHERE phone_number = $1
            "#,
        )
        .bind(phone_number)
        .bind(Json(vec![rating]))
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), phone_number)
    }

    async fn set_phase(
        &self,
        phone_number: &str,
        phase: ConversationPhase,
        user_turn_count: Option<u32>,
    ) -> Result<(), StoreError> {
        let count = user_turn_count.map(|c| i32::try_from(c).unwrap_or(i32::MAX));
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET conversation_phase = $2,
                user_turn_count = COALESCE($3, user_turn_count),
                updated_at = now()
            WHERE phone_number = $1
            "#,
        )
        .bind(phone_number)
        .bind(phase.as_str())
        .bind(count)
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), phone_number)
    }

    async fn mark_intro_sent(&self, phone_number: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE conversations SET intro_sent = TRUE, updated_at = now() WHERE phone_number = $1",
        )
        .bind(phone_number)
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), phone_number)
    }

    async fn set_pending_reply(&self, phone_number: &str, reply: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET pending_ai_response = $2, updated_at = now()
            WHERE phone_number = $1
            "#,
        )
        .bind(phone_number)
        .bind(reply)
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), phone_number)
    }

    async fn take_pending_reply(&self, phone_number: &str) -> Result<Option<String>, StoreError> {
        // Read and clear in one statement so a reply is handed out at most once.
        let previous: Option<Option<String>> = sqlx::query_scalar(
            r#"
            UPDATE conversations c
            SET pending_ai_response = NULL, updated_at = now()
            FROM (
                SELECT phone_number, pending_ai_response
                FROM conversations
                WHERE phone_number = $1
                FOR UPDATE
            ) old
            WHERE c.phone_number = old.phone_number
            RETURNING old.pending_ai_response
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        match previous {
            Some(pending) => Ok(pending.filter(|p| !p.is_empty())),
            None => Err(StoreError::NotFound(phone_number.to_string())),
        }
    }

    async fn delete(&self, phone_number: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE phone_number = $1")
            .bind(phone_number)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
