//! Chat completion HTTP client

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::responder::{ERROR_REPLY, InboundMessage, Responder};

use super::types::*;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Single-turn chat completion client
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ChatClient {
    /// Create a new client
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;

        let base_url = config
            .openai
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            api_key: config.openai.api_key.clone(),
            model: config.assistant.chat_model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create with custom base URL (for testing or custom endpoints)
    pub fn with_base_url(config: &Config, base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(client)
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask for one reply to `user_text` under `system_prompt`
    pub async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending request to chat completions: {}", url);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_text)],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("Chat completion error: {} - {}", status, body);
            return Err(Error::Api(format!("{}: {}", status, body)));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).inspect_err(|e| {
            warn!("Unparseable chat completion: {} - {}", e, body);
        })?;

        info!(
            "Chat completion: finish_reason={:?}, tokens={}",
            parsed.choices.first().and_then(|c| c.finish_reason.as_deref()),
            parsed.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0)
        );

        parsed
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| Error::Api("completion has no text".to_string()))
    }
}

/// Stateless responder: each message is answered on its own
pub struct ChatResponder {
    client: Arc<ChatClient>,
    system_prompt: String,
}

impl ChatResponder {
    pub fn new(client: Arc<ChatClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl Responder for ChatResponder {
    async fn respond(&self, inbound: &InboundMessage) -> String {
        info!("Generating response for message: {}", inbound.text);
        match self.client.complete(&self.system_prompt, &inbound.text).await {
            Ok(text) => text,
            Err(e) => {
                error!(kind = e.kind(), "Chat completion failed: {}", e);
                ERROR_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.openai.api_key = "sk-test".to_string();
        config
    }

    #[tokio::test]
    async fn test_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-4-1106-preview",
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant."},
                    {"role": "user", "content": "Hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::with_base_url(&test_config(), server.uri()).unwrap();
        let text = client.complete("You are a helpful assistant.", "Hi").await.unwrap();
        assert_eq!(text, "Hello!");
    }

    #[tokio::test]
    async fn test_malformed_completion_is_a_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = ChatClient::with_base_url(&test_config(), server.uri()).unwrap();
        let err = client.complete("system", "Hi").await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert_eq!(err.kind(), "json");
    }

    #[tokio::test]
    async fn test_responder_absorbs_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = Arc::new(ChatClient::with_base_url(&test_config(), server.uri()).unwrap());
        let responder = ChatResponder::new(client, "system");

        let reply = responder.respond(&InboundMessage::new("wa_1", "Hi")).await;
        assert_eq!(reply, ERROR_REPLY);
    }
}
