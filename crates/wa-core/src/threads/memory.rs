//! In-memory thread store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ThreadStore;
use crate::Result;

/// Process-local thread store; records are lost on restart
#[derive(Debug, Default, Clone)]
pub struct InMemoryThreadStore {
    threads: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryThreadStore {
    /// Create a new thread store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get record count
    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn lookup(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.threads.read().await.get(user_id).cloned())
    }

    async fn store(&self, user_id: &str, session_id: &str) -> Result<()> {
        self.threads
            .write()
            .await
            .insert(user_id.to_string(), session_id.to_string());
        Ok(())
    }
}
