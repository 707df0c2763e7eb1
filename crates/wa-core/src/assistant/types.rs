//! Assistants API types

use serde::{Deserialize, Serialize};

/// Author of a message in a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Run lifecycle as seen by the poller
///
/// Provider states outside these four collapse into `Running` (not yet
/// terminal) or `Failed` (terminal without a reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Decode the provider's status string
    pub fn from_provider(status: &str) -> Self {
        match status {
            "queued" => RunStatus::Pending,
            "completed" => RunStatus::Completed,
            "failed" | "cancelled" | "expired" | "incomplete" => RunStatus::Failed,
            // in_progress, requires_action, cancelling and anything new
            _ => RunStatus::Running,
        }
    }
}

/// A generation attempt against a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    /// Provider's explanation when the run failed
    pub last_error: Option<String>,
}

impl Run {
    pub fn new(id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            status,
            last_error: None,
        }
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct IdObject {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateMessageRequest<'a> {
    pub role: Role,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRunRequest<'a> {
    pub assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunObject {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<RunObject> for Run {
    fn from(run: RunObject) -> Self {
        let last_error = run.last_error.map(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code,
            (None, Some(message)) => message,
            (None, None) => "unknown error".to_string(),
        });

        Run {
            id: run.id,
            status: RunStatus::from_provider(&run.status),
            last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageList {
    pub data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadMessage {
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl ThreadMessage {
    /// First text part of the message
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.value.as_str()),
            ContentPart::Other => None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextValue {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateAssistantRequest<'a> {
    pub name: &'a str,
    pub instructions: &'a str,
    pub model: &'a str,
    pub tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_resources: Option<serde_json::Value>,
}
