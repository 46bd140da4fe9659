mod config;
mod conversation;
mod db;
mod errors;
mod llm_client;
mod models;
mod prompts;
mod routes;
mod state;
mod store;
mod trust;
mod whatsapp;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::conversation::locks::KeyedLocks;
use crate::conversation::{ConversationService, ConversationSettings};
use crate::db::create_pool;
use crate::llm_client::OpenAiClient;
use crate::prompts::PromptStore;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{ConversationStore, MemoryConversationStore, PgConversationStore};
use crate::whatsapp::{Delivery, WhatsAppClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting trust bot v{}", env!("CARGO_PKG_VERSION"));

    // Conversation store: PostgreSQL when configured, otherwise process memory
    let store: Arc<dyn ConversationStore> = match &config.database_url {
        Some(url) => Arc::new(PgConversationStore::new(create_pool(url).await?)),
        None => {
            warn!("DATABASE_URL not set; conversations are kept in memory and lost on restart");
            Arc::new(MemoryConversationStore::new())
        }
    };

    let prompts = Arc::new(PromptStore::new(config.prompt_dir.clone()));
    info!("Loading system prompts from {}", prompts.root().display());

    let llm = Arc::new(OpenAiClient::new(config.openai_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let messenger = Arc::new(WhatsAppClient::new(
        &config.whatsapp_api_base,
        &config.phone_number_id,
        &config.access_token,
    )?);
    let delivery = Delivery::new(messenger, config.rating_prompt_mode, config.flow_id.clone());
    info!(
        "Rating prompts sent as {:?}, check-in every {} turn(s)",
        config.rating_prompt_mode, config.trust_check_interval
    );

    let conversations = Arc::new(ConversationService::new(
        store,
        llm.clone(),
        prompts,
        ConversationSettings {
            check_in_interval: config.trust_check_interval,
            default_language: config.default_language,
            rating_prompt_mode: config.rating_prompt_mode,
        },
    ));

    // Build app state
    let state = AppState {
        config: config.clone(),
        conversations,
        llm,
        delivery,
        inbound_order: Arc::new(KeyedLocks::new()),
    };

    // Build router
    let app = build_router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
