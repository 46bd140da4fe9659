pub mod conversation;
pub mod language;

pub use conversation::{Conversation, ConversationPhase, Message, MessageKind, Role, TrustRating};
pub use language::Language;
