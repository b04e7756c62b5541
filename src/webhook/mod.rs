//! Webhook endpoint
//!
//! HTTP surface for the messaging platform: the subscription handshake,
//! signed event deliveries, and a health check.

pub mod payload;
pub mod server;
pub mod signature;

pub use payload::{Entry, InboundEnvelope, Message, MessagingEvent, Participant, PAGE_OBJECT};
pub use server::{create_webhook_router, AppState, WebhookError};
pub use signature::{sign, verify, SignatureAlgorithm, SignatureError};
