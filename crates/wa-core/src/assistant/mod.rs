//! Assistant (multi-turn) API client
//!
//! A session is an OpenAI thread; a run asks the assistant to answer the
//! messages posted to that thread.

pub mod bootstrap;
mod client;
mod types;

use async_trait::async_trait;

use crate::Result;

pub use client::OpenAiAssistantClient;
pub use types::{Role, Run, RunStatus};

/// Operations the response flow needs from the assistant provider
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Allocate a new conversation context
    async fn create_session(&self) -> Result<String>;

    /// Confirm the provider still knows `session_id`
    ///
    /// Fails with `Error::SessionNotFound` for stale or unknown ids.
    async fn retrieve_session(&self, session_id: &str) -> Result<()>;

    /// Append a message to the session
    async fn post_message(&self, session_id: &str, role: Role, text: &str) -> Result<()>;

    /// Start a generation run
    async fn start_run(&self, session_id: &str, assistant_id: &str) -> Result<Run>;

    /// Poll a run once
    ///
    /// `Error::TransientProvider` means the poll may be retried.
    async fn get_run_status(&self, session_id: &str, run_id: &str) -> Result<Run>;

    /// Ask the provider to stop a run that is no longer awaited
    ///
    /// An active run blocks new messages on its session until it ends.
    async fn cancel_run(&self, session_id: &str, run_id: &str) -> Result<()>;

    /// Text of the most recent message in the session
    async fn list_latest_message(&self, session_id: &str) -> Result<String>;
}
