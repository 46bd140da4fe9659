//! Background processing of one inbound message, from normalization to
//! delivery. Runs detached from the webhook request.

use thiserror::Error;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::conversation::ConversationError;
use crate::llm_client::LlmError;
use crate::models::MessageKind;
use crate::state::AppState;
use crate::whatsapp::{InboundContent, InboundMessage, WhatsAppError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error("Delivery failed: {0}")]
    WhatsApp(#[from] WhatsAppError),

    #[error("Transcription failed: {0}")]
    Transcription(#[source] LlmError),
}

/// Processes the messages of one webhook notification in the order they
/// were sent.
pub async fn process_notification(state: AppState, messages: Vec<InboundMessage>) {
    for message in messages {
        process_inbound(&state, message).await;
    }
}

/// Processes one message end to end. Failures are logged and the message is
/// dropped; the sender gets no reply for it.
pub async fn process_inbound(state: &AppState, message: InboundMessage) {
    let request_id = Uuid::new_v4();
    let span = info_span!("inbound", %request_id, sender = %message.sender_id);

    async move {
        // Taken before transcription; later messages from this sender queue here.
        let _turn = state.inbound_order.lock(&message.sender_id).await;
        if let Err(e) = run(state, &message).await {
            error!(
                "Failed to process message {:?}: {e}",
                message.message_id.as_deref().unwrap_or("-")
            );
        }
    }
    .instrument(span)
    .await
}

async fn run(state: &AppState, message: &InboundMessage) -> Result<(), PipelineError> {
    let (text, kind) = normalize(state, &message.content).await?;

    let response = state
        .conversations
        .handle_incoming(&message.sender_id, &text, kind)
        .await?;

    state.delivery.deliver(&message.sender_id, &response).await?;
    info!(
        "Delivered {} message(s){}",
        response.text_messages.len(),
        if response.rating_prompt.is_some() {
            " and a rating prompt"
        } else {
            ""
        }
    );
    Ok(())
}

/// Reduces inbound content to text. Voice notes are transcribed and then
/// treated as if the user had typed the transcript.
async fn normalize(
    state: &AppState,
    content: &InboundContent,
) -> Result<(String, MessageKind), PipelineError> {
    match content {
        InboundContent::Text(text) => Ok((text.clone(), MessageKind::Text)),
        InboundContent::Interactive(id) => Ok((id.clone(), MessageKind::Interactive)),
        InboundContent::Audio {
            media_id,
            mime_type,
        } => {
            let media = state.delivery.messenger().fetch_media(media_id).await?;
            let mime = mime_type.as_deref().unwrap_or(&media.mime_type);
            let transcript = state
                .llm
                .transcribe(media.bytes.clone(), mime)
                .await
                .map_err(PipelineError::Transcription)?;
            info!("Transcribed voice note {media_id} ({} chars)", transcript.len());
            Ok((transcript, MessageKind::Text))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::config::RatingPromptMode;
    use crate::conversation::locks::KeyedLocks;
    use crate::conversation::machine::tests::{settings, shipped_prompts, ScriptedLlm};
    use crate::conversation::ConversationService;
    use crate::models::ConversationPhase;
    use crate::state::tests::test_config;
    use crate::store::{ConversationStore, MemoryConversationStore};
    use crate::whatsapp::client::MediaDownload;
    use crate::whatsapp::delivery::tests::{RecordingMessenger, Sent};
    use crate::whatsapp::Delivery;

    fn state_with(
        llm: ScriptedLlm,
        messenger: Arc<RecordingMessenger>,
    ) -> (AppState, Arc<MemoryConversationStore>) {
        let store = Arc::new(MemoryConversationStore::new());
        let llm = Arc::new(llm);
        let conversations = Arc::new(ConversationService::new(
            store.clone(),
            llm.clone(),
            shipped_prompts(),
            settings(),
        ));
        let state = AppState {
            config: test_config(),
            conversations,
            llm,
            delivery: Delivery::new(messenger, RatingPromptMode::Text, None),
            inbound_order: Arc::new(KeyedLocks::new()),
        };
        (state, store)
    }

    fn inbound(content: InboundContent) -> InboundMessage {
        InboundMessage {
            sender_id: "15550001111".into(),
            message_id: Some("wamid.1".into()),
            content,
        }
    }

    #[tokio::test]
    async fn test_text_message_gets_intro() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (state, store) = state_with(ScriptedLlm::default(), messenger.clone());

        process_inbound(&state, inbound(InboundContent::Text("hello".into()))).await;

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Sent::Text(to, body) => {
                assert_eq!(to, "15550001111");
                assert!(body.contains("reply with a number from 1 to 10"));
            }
            other => panic!("unexpected send {other:?}"),
        }
        assert!(store.get("15550001111").await.unwrap().unwrap().intro_sent);
    }

    #[tokio::test]
    async fn test_voice_note_is_transcribed_and_handled_as_text() {
        let messenger = Arc::new(RecordingMessenger::default());
        *messenger.media.lock().unwrap() = Some(MediaDownload {
            bytes: Bytes::from_static(b"OggS"),
            mime_type: "audio/ogg; codecs=opus".into(),
        });
        let llm = ScriptedLlm {
            transcript: Some("8".into()),
            ..ScriptedLlm::default()
        };
        let (state, store) = state_with(llm, messenger.clone());
        let audio = || {
            inbound(InboundContent::Audio {
                media_id: "media-1".into(),
                mime_type: None,
            })
        };

        process_inbound(&state, audio()).await;
        process_inbound(&state, audio()).await;

        let c = store.get("15550001111").await.unwrap().unwrap();
        assert_eq!(c.feeling_array.len(), 1);
        assert_eq!(c.feeling_array[0].score, 8);
        assert_eq!(messenger.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_media_download_sends_nothing() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (state, store) = state_with(ScriptedLlm::default(), messenger.clone());

        process_inbound(
            &state,
            inbound(InboundContent::Audio {
                media_id: "missing".into(),
                mime_type: Some("audio/ogg".into()),
            }),
        )
        .await;

        assert!(messenger.sent().is_empty());
        assert!(store.get("15550001111").await.unwrap().is_none());
    }

    fn slow_media_messenger() -> Arc<RecordingMessenger> {
        let messenger = RecordingMessenger {
            media_delay: Some(Duration::from_millis(50)),
            ..RecordingMessenger::default()
        };
        *messenger.media.lock().unwrap() = Some(MediaDownload {
            bytes: Bytes::from_static(b"OggS"),
            mime_type: "audio/ogg".into(),
        });
        Arc::new(messenger)
    }

    fn voice_note() -> InboundMessage {
        inbound(InboundContent::Audio {
            media_id: "media-1".into(),
            mime_type: None,
        })
    }

    #[tokio::test]
    async fn test_notification_messages_keep_their_order() {
        let messenger = slow_media_messenger();
        let llm = ScriptedLlm {
            transcript: Some("hello".into()),
            ..ScriptedLlm::default()
        };
        let (state, store) = state_with(llm, messenger.clone());

        process_notification(
            state,
            vec![voice_note(), inbound(InboundContent::Text("7".into()))],
        )
        .await;

        let c = store.get("15550001111").await.unwrap().unwrap();
        assert_eq!(c.conversation_phase, ConversationPhase::Normal);
        assert_eq!(c.feeling_array.len(), 1);
        assert_eq!(c.feeling_array[0].score, 7);
        assert_eq!(messenger.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_later_message_waits_for_slow_voice_note() {
        let messenger = slow_media_messenger();
        let llm = ScriptedLlm {
            transcript: Some("hello".into()),
            ..ScriptedLlm::default()
        };
        let (state, store) = state_with(llm, messenger.clone());

        let voice = tokio::spawn({
            let state = state.clone();
            async move { process_inbound(&state, voice_note()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        process_inbound(&state, inbound(InboundContent::Text("7".into()))).await;
        voice.await.unwrap();

        let c = store.get("15550001111").await.unwrap().unwrap();
        assert_eq!(c.conversation_phase, ConversationPhase::Normal);
        assert_eq!(c.feeling_array.len(), 1);
        assert_eq!(c.feeling_array[0].score, 7);
        assert_eq!(state.inbound_order.len(), 0);
    }
}
