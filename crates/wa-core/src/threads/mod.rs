//! Thread store
//!
//! Durable mapping from an end-user identifier (a WhatsApp id) to the
//! provider session (thread) that carries that user's conversation.

mod memory;
mod store;

use async_trait::async_trait;

use crate::Result;

pub use memory::InMemoryThreadStore;
pub use store::SqliteThreadStore;

/// Persistence backend for user → session records
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Session id recorded for `user_id`, or `None` when the user is unknown
    async fn lookup(&self, user_id: &str) -> Result<Option<String>>;

    /// Record `session_id` for `user_id`, replacing any previous record
    async fn store(&self, user_id: &str, session_id: &str) -> Result<()>;
}
