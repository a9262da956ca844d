//! Inbound webhook ingestion for gateway notifications.

pub mod event;
pub mod handler;
pub mod signature;

pub use event::{EventKind, GatewayEvent, WebhookPayload};
pub use signature::{sign, SignatureError, WebhookVerifier};
