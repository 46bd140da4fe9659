use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::conversation::pipeline::process_notification;
use crate::errors::AppError;
use crate::state::AppState;
use crate::whatsapp::extract_messages;

#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
}

/// Checks a subscription handshake and returns the challenge to echo.
/// A missing mode is treated as `subscribe`.
pub fn verify_subscription(params: &VerifyParams, expected_token: &str) -> Result<String, AppError> {
    let mode = params.mode.as_deref().unwrap_or("subscribe");
    if mode != "subscribe" {
        return Err(AppError::Forbidden(format!("unsupported hub.mode '{mode}'")));
    }
    if params.verify_token.as_deref() != Some(expected_token) {
        return Err(AppError::Forbidden("verify token mismatch".to_string()));
    }
    params
        .challenge
        .clone()
        .ok_or_else(|| AppError::Validation("hub.challenge is required".to_string()))
}

/// GET /
/// Webhook subscription handshake.
pub async fn handle_verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, AppError> {
    let challenge = verify_subscription(&params, &state.config.verify_token)?;
    info!("Webhook subscription verified");
    Ok(challenge)
}

/// POST /
/// Acknowledges every notification immediately. Its messages are processed in
/// order on one background task; malformed bodies are logged and dropped.
pub async fn handle_notification(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => {
            let messages = extract_messages(&payload, &state.config.phone_number_id);
            debug!("Webhook notification carried {} message(s)", messages.len());
            if !messages.is_empty() {
                tokio::spawn(process_notification(state.clone(), messages));
            }
        }
        Err(e) => warn!("Ignoring webhook body that is not JSON: {e}"),
    }

    Json(json!({ "status": "accepted" }))
}
