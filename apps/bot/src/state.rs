use std::sync::Arc;

use crate::config::Config;
use crate::conversation::locks::KeyedLocks;
use crate::conversation::ConversationService;
use crate::llm_client::LlmGateway;
use crate::whatsapp::Delivery;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub conversations: Arc<ConversationService>,
    /// Used directly for voice-note transcription; chat completions go
    /// through `conversations`.
    pub llm: Arc<dyn LlmGateway>,
    /// Outbound channel. Also serves media downloads.
    pub delivery: Delivery,
    /// Held per sender from before normalization until the reply is delivered,
    /// so a slow transcription is never overtaken by a later message.
    pub inbound_order: Arc<KeyedLocks>,
}
