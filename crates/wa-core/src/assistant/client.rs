//! OpenAI Assistants API HTTP client

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::types::*;
use super::AssistantApi;
use crate::config::OpenAiConfig;
use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Why a request did not yield a decoded body
#[derive(Debug)]
enum Failure {
    /// Connection, timeout or body-read problem
    Transport(reqwest::Error),
    /// Non-success HTTP status with the response body
    Status(StatusCode, String),
    /// Success status but an unexpected body
    Decode(String),
}

impl Failure {
    fn is_transient(&self) -> bool {
        match self {
            Failure::Transport(_) => true,
            Failure::Status(status, _) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Failure::Decode(_) => false,
        }
    }

    fn is_not_found(&self) -> bool {
        matches!(self, Failure::Status(StatusCode::NOT_FOUND, _))
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Transport(e) => write!(f, "{}", e),
            Failure::Status(status, body) => write!(f, "{}: {}", status, body),
            Failure::Decode(msg) => write!(f, "unexpected response: {}", msg),
        }
    }
}

/// Assistants API client (threads, messages, runs, files, assistants)
#[derive(Clone)]
pub struct OpenAiAssistantClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAssistantClient {
    /// Create a new client from configuration
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(Error::Http)?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create with custom base URL (for testing or proxies)
    pub fn with_base_url(config: &OpenAiConfig, base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(client)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> std::result::Result<T, Failure> {
        let response = request.send().await.map_err(Failure::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(Failure::Transport)?;

        if !status.is_success() {
            warn!("Assistants API error: {} - {}", status, body);
            return Err(Failure::Status(status, body));
        }

        serde_json::from_str(&body).map_err(|e| Failure::Decode(format!("{} - {}", e, body)))
    }

    /// Upload a reference document for file search
    ///
    /// Returns `None` when the file does not exist.
    pub async fn upload_file(&self, path: &Path) -> Result<Option<String>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Reference file not found: {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "reference".to_string());

        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let file: IdObject = self
            .send(self.request(Method::POST, "/files").multipart(form))
            .await
            .map_err(|e| Error::Bootstrap(format!("file upload failed: {}", e)))?;

        info!("Uploaded {} as {}", path.display(), file.id);
        Ok(Some(file.id))
    }

    /// Create an assistant with file search, attaching `file_id` when given
    pub async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
        file_id: Option<&str>,
    ) -> Result<String> {
        let tool_resources = file_id.map(|id| {
            serde_json::json!({
                "file_search": { "vector_stores": [{ "file_ids": [id] }] }
            })
        });

        let body = CreateAssistantRequest {
            name,
            instructions,
            model,
            tools: vec![serde_json::json!({ "type": "file_search" })],
            tool_resources,
        };

        let assistant: IdObject = self
            .send(self.request(Method::POST, "/assistants").json(&body))
            .await
            .map_err(|e| Error::Bootstrap(format!("assistant creation failed: {}", e)))?;

        info!("Created assistant {}", assistant.id);
        Ok(assistant.id)
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistantClient {
    async fn create_session(&self) -> Result<String> {
        let thread: IdObject = self
            .send(self.request(Method::POST, "/threads").json(&serde_json::json!({})))
            .await
            .map_err(|e| Error::SessionCreation(e.to_string()))?;
        Ok(thread.id)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<()> {
        self.send::<IdObject>(self.request(Method::GET, &format!("/threads/{}", session_id)))
            .await
            .map(|_| ())
            .map_err(|e| {
                if e.is_not_found() {
                    Error::SessionNotFound(session_id.to_string())
                } else {
                    Error::Api(e.to_string())
                }
            })
    }

    async fn post_message(&self, session_id: &str, role: Role, text: &str) -> Result<()> {
        let body = CreateMessageRequest { role, content: text };
        self.send::<IdObject>(
            self.request(Method::POST, &format!("/threads/{}/messages", session_id))
                .json(&body),
        )
        .await
        .map(|_| ())
        .map_err(|e| Error::MessagePost(e.to_string()))
    }

    async fn start_run(&self, session_id: &str, assistant_id: &str) -> Result<Run> {
        let body = CreateRunRequest { assistant_id };
        let run: RunObject = self
            .send(
                self.request(Method::POST, &format!("/threads/{}/runs", session_id))
                    .json(&body),
            )
            .await
            .map_err(|e| Error::RunStart(e.to_string()))?;
        Ok(run.into())
    }

    async fn get_run_status(&self, session_id: &str, run_id: &str) -> Result<Run> {
        let run: RunObject = self
            .send(self.request(
                Method::GET,
                &format!("/threads/{}/runs/{}", session_id, run_id),
            ))
            .await
            .map_err(|e| {
                if e.is_transient() {
                    Error::TransientProvider(e.to_string())
                } else if e.is_not_found() {
                    Error::SessionNotFound(session_id.to_string())
                } else {
                    Error::Api(e.to_string())
                }
            })?;
        Ok(run.into())
    }

    async fn cancel_run(&self, session_id: &str, run_id: &str) -> Result<()> {
        let run: RunObject = self
            .send(self.request(
                Method::POST,
                &format!("/threads/{}/runs/{}/cancel", session_id, run_id),
            ))
            .await
            .map_err(|e| Error::Api(format!("cancel {}: {}", run_id, e)))?;
        info!("Cancelled run {} ({:?})", run_id, Run::from(run).status);
        Ok(())
    }

    async fn list_latest_message(&self, session_id: &str) -> Result<String> {
        let list: MessageList = self
            .send(
                self.request(Method::GET, &format!("/threads/{}/messages", session_id))
                    .query(&[("order", "desc"), ("limit", "1")]),
            )
            .await
            .map_err(|e| Error::Api(e.to_string()))?;

        let latest = list
            .data
            .first()
            .ok_or_else(|| Error::NoMessages(session_id.to_string()))?;

        latest
            .text()
            .map(str::to_string)
            .ok_or_else(|| Error::NoMessages(format!("{} (latest message has no text)", session_id)))
    }
}
