//! Error types for wa-core

use std::time::Duration;

use thiserror::Error;

/// Main error type for wa-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Thread store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Failed to create session: {0}")]
    SessionCreation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Failed to post message: {0}")]
    MessagePost(String),

    #[error("Failed to start run: {0}")]
    RunStart(String),

    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    #[error("Run {run_id} did not finish within {waited:?}")]
    RunTimeout { run_id: String, waited: Duration },

    #[error("No messages in session {0}")]
    NoMessages(String),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Assistant bootstrap failed: {0}")]
    Bootstrap(String),
}

impl Error {
    /// Stable label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::SessionCreation(_) => "session_creation",
            Self::SessionNotFound(_) => "session_not_found",
            Self::MessagePost(_) => "message_post",
            Self::RunStart(_) => "run_start",
            Self::TransientProvider(_) => "transient_provider",
            Self::RunTimeout { .. } => "run_timeout",
            Self::NoMessages(_) => "no_messages",
            Self::Api(_) => "api",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Bootstrap(_) => "bootstrap",
        }
    }

    /// Whether the run poller should try again after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientProvider(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

/// Result type alias for wa-core
pub type Result<T> = std::result::Result<T, Error>;
