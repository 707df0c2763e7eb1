//! Response generation
//!
//! Turns an inbound (message, user id) pair into reply text. Errors never
//! leave this module: callers always get a string they can send back.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::assistant::{AssistantApi, Role};
use crate::lock::UserLocks;
use crate::poller::{RunOutcome, RunPoller};
use crate::threads::ThreadStore;
use crate::{Error, Result};

/// Reply when the provider reports the run as failed
pub const RUN_FAILED_REPLY: &str = "Sorry, the assistant run failed.";

/// Reply for any other error in the flow
pub const ERROR_REPLY: &str = "Sorry, something went wrong.";

/// A text message already extracted from the webhook payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender id (WhatsApp phone number)
    pub user_id: String,
    pub text: String,
    /// Profile name, when the platform supplied one
    pub display_name: Option<String>,
}

impl InboundMessage {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Anything that can answer an inbound message
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, inbound: &InboundMessage) -> String;
}

/// Structured result of one response flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    RunFailed,
}

impl Reply {
    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) => text,
            Reply::RunFailed => RUN_FAILED_REPLY.to_string(),
        }
    }
}

/// Stateful responder: one assistant thread per user
pub struct ResponseGenerator {
    api: Arc<dyn AssistantApi>,
    threads: Arc<dyn ThreadStore>,
    poller: RunPoller,
    locks: UserLocks,
}

impl ResponseGenerator {
    pub fn new(api: Arc<dyn AssistantApi>, threads: Arc<dyn ThreadStore>, poller: RunPoller) -> Self {
        Self {
            api,
            threads,
            poller,
            locks: UserLocks::new(),
        }
    }

    /// Answer `message_text` from `user_id` using `assistant_id`
    ///
    /// Always returns text: the assistant's reply, [`RUN_FAILED_REPLY`], or
    /// [`ERROR_REPLY`].
    pub async fn generate_response(
        &self,
        message_text: &str,
        user_id: &str,
        display_name: &str,
        assistant_id: &str,
    ) -> String {
        match self
            .try_generate(message_text, user_id, display_name, assistant_id)
            .await
        {
            Ok(reply) => reply.into_text(),
            Err(e) => {
                error!(kind = e.kind(), user_id, "Error generating response: {}", e);
                ERROR_REPLY.to_string()
            }
        }
    }

    /// Same flow as [`generate_response`](Self::generate_response) without
    /// absorbing errors
    pub async fn try_generate(
        &self,
        message_text: &str,
        user_id: &str,
        display_name: &str,
        assistant_id: &str,
    ) -> Result<Reply> {
        let _guard = self.locks.acquire(user_id).await;
        info!("Generating response for {} ({})", user_id, display_name);

        let session_id = self.resolve_session(user_id).await?;

        self.api
            .post_message(&session_id, Role::User, message_text)
            .await?;

        let run = self.api.start_run(&session_id, assistant_id).await?;
        match self.poller.wait(self.api.as_ref(), &session_id, run).await? {
            RunOutcome::Completed => {
                let text = self.api.list_latest_message(&session_id).await?;
                Ok(Reply::Text(text))
            }
            RunOutcome::Failed { .. } => Ok(Reply::RunFailed),
        }
    }

    /// Existing session for the user, or a fresh one when absent or stale
    async fn resolve_session(&self, user_id: &str) -> Result<String> {
        if let Some(session_id) = self.threads.lookup(user_id).await? {
            match self.api.retrieve_session(&session_id).await {
                Ok(()) => return Ok(session_id),
                Err(Error::SessionNotFound(_)) => {
                    warn!("Thread {} for {} is gone, starting a new one", session_id, user_id);
                }
                Err(e) => return Err(e),
            }
        }

        let session_id = self.api.create_session().await?;
        self.threads.store(user_id, &session_id).await?;
        info!("Created thread {} for {}", session_id, user_id);
        Ok(session_id)
    }

    /// Bind to an assistant so the generator can serve as a [`Responder`]
    pub fn with_assistant(self: Arc<Self>, assistant_id: impl Into<String>) -> AssistantResponder {
        AssistantResponder {
            generator: self,
            assistant_id: assistant_id.into(),
        }
    }
}

/// [`ResponseGenerator`] bound to one assistant
pub struct AssistantResponder {
    generator: Arc<ResponseGenerator>,
    assistant_id: String,
}

#[async_trait]
impl Responder for AssistantResponder {
    async fn respond(&self, inbound: &InboundMessage) -> String {
        self.generator
            .generate_response(
                &inbound.text,
                &inbound.user_id,
                inbound.display_name.as_deref().unwrap_or(""),
                &self.assistant_id,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_text() {
        assert_eq!(Reply::Text("hi".into()).into_text(), "hi");
        assert_eq!(Reply::RunFailed.into_text(), RUN_FAILED_REPLY);
        assert_ne!(RUN_FAILED_REPLY, ERROR_REPLY);
    }

    #[test]
    fn test_inbound_builder() {
        let inbound = InboundMessage::new("wa_1", "hello").with_display_name("Jo");
        assert_eq!(inbound.display_name.as_deref(), Some("Jo"));
    }
}
