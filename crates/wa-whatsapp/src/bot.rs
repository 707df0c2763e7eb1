//! WhatsApp bot wrapper

use std::net::SocketAddr;
use std::sync::Arc;

use wa_core::Responder;
use wa_core::config::WhatsAppConfig;

use crate::cloud::CloudApiClient;
use crate::error::Result;
use crate::webhook::{WebhookServer, WebhookState};

/// WhatsApp bot: webhook in, Cloud API out
pub struct WhatsAppBot {
    cloud_client: Arc<CloudApiClient>,
    responder: Arc<dyn Responder>,
    verify_token: Option<String>,
    port: u16,
}

impl WhatsAppBot {
    /// Create a new WhatsApp bot
    pub fn new(config: &WhatsAppConfig, responder: Arc<dyn Responder>) -> Result<Self> {
        let cloud_client = Arc::new(CloudApiClient::new(config)?);

        Ok(Self {
            cloud_client,
            responder,
            verify_token: config.verify_token.clone(),
            port: config.port,
        })
    }

    /// Start the bot (webhook server)
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let state = WebhookState::new(self.responder, self.cloud_client, self.verify_token);

        WebhookServer::new(addr, state).start().await
    }
}
