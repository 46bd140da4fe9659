//! WhatsApp Cloud API: webhook payload normalization and outbound delivery.

pub mod client;
pub mod delivery;
pub mod payload;

pub use client::{WhatsAppClient, WhatsAppError};
pub use delivery::Delivery;
pub use payload::{extract_messages, InboundContent, InboundMessage};
