//! Reconciles the webhook envelope shapes into [`InboundMessage`]s.
//!
//! Parsing is defensive: anything we do not recognise is skipped so that one
//! odd entry never fails the whole delivery.

use serde_json::Value;
use tracing::{debug, warn};

use crate::trust::rating::structured_reply_id;

#[derive(Debug, Clone, PartialEq)]
pub enum InboundContent {
    Text(String),
    /// Reply identifier from a list, button or flow answer.
    Interactive(String),
    Audio {
        media_id: String,
        mime_type: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sender_id: String,
    pub message_id: Option<String>,
    pub content: InboundContent,
}

/// Extracts the processable messages addressed to `phone_number_id`.
///
/// Accepts the full `whatsapp_business_account` notification
/// (`entry[].changes[].value`) and the bare `{ "field": "messages", "value" }`
/// shape sent by the dashboard's test button.
pub fn extract_messages(body: &Value, phone_number_id: &str) -> Vec<InboundMessage> {
    let values: Vec<&Value> = if body.get("object").and_then(Value::as_str)
        == Some("whatsapp_business_account")
    {
        body.get("entry")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.get("changes").and_then(Value::as_array))
            .flatten()
            .filter_map(|change| change.get("value"))
            .collect()
    } else if body.get("field").and_then(Value::as_str) == Some("messages") {
        body.get("value").into_iter().collect()
    } else {
        debug!("Ignoring webhook payload with unrecognised envelope");
        Vec::new()
    };

    values
        .into_iter()
        .filter(|value| addressed_to(value, phone_number_id))
        .filter_map(|value| value.get("messages").and_then(Value::as_array))
        .flatten()
        .filter_map(parse_message)
        .collect()
}

fn addressed_to(value: &Value, phone_number_id: &str) -> bool {
    let incoming = value
        .get("metadata")
        .and_then(|m| m.get("phone_number_id"))
        .and_then(value_as_string);
    match incoming {
        Some(id) if id == phone_number_id => true,
        other => {
            debug!("Ignoring payload for phone_number_id {other:?}");
            false
        }
    }
}

fn parse_message(message: &Value) -> Option<InboundMessage> {
    let sender_id = message.get("from").and_then(Value::as_str)?.to_string();
    let message_id = message.get("id").and_then(Value::as_str).map(String::from);
    let msg_type = message.get("type").and_then(Value::as_str).unwrap_or_default();

    let content = match msg_type {
        "text" => message
            .get("text")
            .and_then(|t| t.get("body"))
            .and_then(Value::as_str)
            .map(|body| InboundContent::Text(body.to_string())),
        "interactive" => message.get("interactive").and_then(parse_interactive),
        "audio" => message.get("audio").and_then(|audio| {
            let media_id = audio.get("id").and_then(Value::as_str)?;
            Some(InboundContent::Audio {
                media_id: media_id.to_string(),
                mime_type: audio.get("mime_type").and_then(Value::as_str).map(String::from),
            })
        }),
        other => {
            debug!("Skipping unsupported message type '{other}' from {sender_id}");
            None
        }
    }?;

    Some(InboundMessage {
        sender_id,
        message_id,
        content,
    })
}

fn parse_interactive(interactive: &Value) -> Option<InboundContent> {
    let kind = interactive.get("type").and_then(Value::as_str)?;
    match kind {
        "nfm_reply" => {
            let raw = interactive
                .get("nfm_reply")
                .and_then(|r| r.get("response_json"))
                .and_then(Value::as_str)?;
            let response: Value = match serde_json::from_str(raw) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Unparsable flow response_json: {e}");
                    return None;
                }
            };
            // A missing rating still yields an identifier so the user is re-prompted.
            let rating = response
                .get("confidence_rating")
                .and_then(value_as_string)
                .unwrap_or_default();
            Some(InboundContent::Interactive(structured_reply_id(rating)))
        }
        "list_reply" | "button_reply" => interactive
            .get(kind)
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(|id| InboundContent::Interactive(id.to_string())),
        other => {
            debug!("Skipping interactive reply of type '{other}'");
            None
        }
    }
}

/// Whole-number floats such as `8.0` render as `8`.
fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some((f as i64).to_string())
            }
            _ => Some(n.to_string()),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const PHONE_ID: &str = "106540352242922";

    fn full_envelope(messages: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA_ID",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {
                            "display_phone_number": "15550000000",
                            "phone_number_id": PHONE_ID
                        },
                        "messages": messages
                    }
                }]
            }]
        })
    }

    #[test]
    fn test_text_message_in_full_envelope() {
        let body = full_envelope(json!([{
            "from": "5511999990000",
            "id": "wamid.1",
            "type": "text",
            "text": { "body": "hello" }
        }]));
        let messages = extract_messages(&body, PHONE_ID);
        assert_eq!(
            messages,
            vec![InboundMessage {
                sender_id: "5511999990000".into(),
                message_id: Some("wamid.1".into()),
                content: InboundContent::Text("hello".into()),
            }]
        );
    }

    #[test]
    fn test_direct_value_envelope_with_numeric_phone_id() {
        let body = json!({
            "field": "messages",
            "value": {
                "metadata": { "phone_number_id": 106540352242922u64 },
                "messages": [{ "from": "1", "type": "text", "text": { "body": "7" } }]
            }
        });
        let messages = extract_messages(&body, PHONE_ID);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, InboundContent::Text("7".into()));
    }

    #[test]
    fn test_other_phone_number_id_is_ignored() {
        let body = full_envelope(json!([{ "from": "1", "type": "text", "text": { "body": "hi" } }]));
        assert!(extract_messages(&body, "999").is_empty());
    }

    #[test]
    fn test_status_updates_and_unknown_shapes_are_skipped() {
        let statuses = json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": {
                "metadata": { "phone_number_id": PHONE_ID },
                "statuses": [{ "status": "delivered" }]
            }}]}]
        });
        assert!(extract_messages(&statuses, PHONE_ID).is_empty());
        assert!(extract_messages(&json!({ "hello": "world" }), PHONE_ID).is_empty());
        assert!(extract_messages(&json!([1, 2, 3]), PHONE_ID).is_empty());
    }

    #[test]
    fn test_flow_reply_becomes_rating_identifier() {
        let body = full_envelope(json!([{
            "from": "1",
            "type": "interactive",
            "interactive": {
                "type": "nfm_reply",
                "nfm_reply": {
                    "name": "flow",
                    "response_json": "{\"confidence_rating\": \"8\", \"flow_token\": \"x\"}"
                }
            }
        }]));
        let messages = extract_messages(&body, PHONE_ID);
        assert_eq!(messages[0].content, InboundContent::Interactive("rating_8".into()));
    }

    #[test]
    fn test_flow_reply_with_numeric_rating() {
        let interactive = json!({
            "type": "nfm_reply",
            "nfm_reply": { "response_json": "{\"confidence_rating\": 3}" }
        });
        assert_eq!(
            parse_interactive(&interactive),
            Some(InboundContent::Interactive("rating_3".into()))
        );
    }

    #[test]
    fn test_flow_reply_with_whole_float_rating() {
        let interactive = json!({
            "type": "nfm_reply",
            "nfm_reply": { "response_json": "{\"confidence_rating\": 8.0}" }
        });
        assert_eq!(
            parse_interactive(&interactive),
            Some(InboundContent::Interactive("rating_8".into()))
        );

        // Fractional scores stay as sent and are rejected by the rating parser.
        let interactive = json!({
            "type": "nfm_reply",
            "nfm_reply": { "response_json": "{\"confidence_rating\": 7.5}" }
        });
        assert_eq!(
            parse_interactive(&interactive),
            Some(InboundContent::Interactive("rating_7.5".into()))
        );
    }

    #[test]
    fn test_list_and_button_replies_use_their_ids() {
        let list = json!({ "type": "list_reply", "list_reply": { "id": "rating_10", "title": "10" } });
        let button = json!({ "type": "button_reply", "button_reply": { "id": "rating_2", "title": "2" } });
        assert_eq!(
            parse_interactive(&list),
            Some(InboundContent::Interactive("rating_10".into()))
        );
        assert_eq!(
            parse_interactive(&button),
            Some(InboundContent::Interactive("rating_2".into()))
        );
    }

    #[test]
    fn test_audio_message_carries_media_id() {
        let body = full_envelope(json!([{
            "from": "1",
            "type": "audio",
            "audio": { "id": "MEDIA_1", "mime_type": "audio/ogg; codecs=opus", "voice": true }
        }]));
        let messages = extract_messages(&body, PHONE_ID);
        assert_eq!(
            messages[0].content,
            InboundContent::Audio {
                media_id: "MEDIA_1".into(),
                mime_type: Some("audio/ogg; codecs=opus".into()),
            }
        );
    }

    #[test]
    fn test_malformed_messages_are_dropped_individually() {
        let body = full_envelope(json!([
            { "type": "text", "text": { "body": "no sender" } },
            { "from": "1", "type": "image", "image": { "id": "IMG" } },
            { "from": "2", "type": "text", "text": { "body": "kept" } }
        ]));
        let messages = extract_messages(&body, PHONE_ID);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, "2");
    }
}
