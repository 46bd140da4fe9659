pub mod health;
pub mod webhook;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // WhatsApp webhook: subscription handshake and notifications
        .route(
            "/",
            get(webhook::handle_verify).post(webhook::handle_notification),
        )
        .with_state(state)
}
