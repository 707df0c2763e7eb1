//! wa-core: WhatsApp assistant bridge core library
//!
//! Keeps one assistant thread per WhatsApp user, runs the assistant on each
//! inbound message, and turns the outcome into reply text.

pub mod assistant;
pub mod config;
pub mod error;
pub mod llm;
pub mod lock;
pub mod poller;
pub mod responder;
pub mod threads;

pub use assistant::{AssistantApi, OpenAiAssistantClient, Role, Run, RunStatus};
pub use config::{Config, PollerConfig, ResponderMode};
pub use error::{Error, Result};
pub use llm::{ChatClient, ChatResponder};
pub use lock::{Ticket, UserGuard, UserLocks};
pub use poller::{RunOutcome, RunPoller};
pub use responder::{
    AssistantResponder, ERROR_REPLY, InboundMessage, RUN_FAILED_REPLY, Reply, Responder,
    ResponseGenerator,
};
pub use threads::{InMemoryThreadStore, SqliteThreadStore, ThreadStore};
