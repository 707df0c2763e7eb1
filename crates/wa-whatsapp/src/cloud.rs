//! WhatsApp Cloud API client

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use wa_core::config::WhatsAppConfig;

use crate::error::{Result, WhatsAppError};

/// Graph API host
const GRAPH_API_URL: &str = "https://graph.facebook.com";

/// Upper bound for one send request
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest text body the Cloud API accepts
pub const MAX_TEXT_LEN: usize = 4096;

/// Cloud API client for outbound messages
#[derive(Debug, Clone)]
pub struct CloudApiClient {
    client: Client,
    access_token: String,
    phone_number_id: String,
    api_version: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SendTextPayload<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

impl CloudApiClient {
    /// Create a new client
    pub fn new(config: &WhatsAppConfig) -> Result<Self> {
        if config.access_token.is_empty() || config.phone_number_id.is_empty() {
            return Err(WhatsAppError::CredentialsNotSet);
        }

        Ok(Self {
            client: Self::http_client(SEND_TIMEOUT)?,
            access_token: config.access_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
            api_version: config.api_version.clone(),
            base_url: GRAPH_API_URL.to_string(),
        })
    }

    /// Create with custom base URL (for testing)
    pub fn with_base_url(config: &WhatsAppConfig, base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(client)
    }

    /// Replace the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Self::http_client(timeout)?;
        Ok(self)
    }

    fn http_client(timeout: Duration) -> Result<Client> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    /// Send a text message; returns the WhatsApp message id
    pub async fn send_text(&self, to: &str, body: &str) -> Result<String> {
        info!("Sending WhatsApp message to {}", to);

        let url = format!(
            "{}/{}/{}/messages",
            self.base_url, self.api_version, self.phone_number_id
        );

        let payload = SendTextPayload {
            messaging_product: "whatsapp",
            to,
            kind: "text",
            text: TextBody {
                body: truncate(body, MAX_TEXT_LEN),
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("WhatsApp API error: {} - {}", status, text);
            return Err(WhatsAppError::Api(format!(
                "Failed to send message: {} - {}",
                status, text
            )));
        }

        let result: SendResponse = response.json().await?;
        let id = result
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .unwrap_or_default();

        info!("Sent message to {} ({})", to, id);
        Ok(id)
    }
}

/// Cut `text` to at most `max` characters on a char boundary
fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
