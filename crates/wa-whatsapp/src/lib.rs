//! wa-whatsapp: WhatsApp Business Cloud API surface
//!
//! Receives message webhooks, hands each text message to a
//! [`wa_core::Responder`], and sends the reply back through the Cloud API.

pub mod bot;
pub mod cloud;
pub mod error;
pub mod payload;
pub mod webhook;

pub use bot::WhatsAppBot;
pub use cloud::CloudApiClient;
pub use error::{Result, WhatsAppError};
pub use payload::WebhookPayload;
pub use webhook::{WebhookServer, WebhookState, create_router};
