//! Thread persistence using SQLite

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::ThreadStore;
use crate::{Error, Result};

/// SQLite-based thread store
pub struct SqliteThreadStore {
    conn: Mutex<Connection>,
}

impl SqliteThreadStore {
    /// Open (or create) the store at `db_path`
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS threads (
                user_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StorageUnavailable("thread store lock poisoned".to_string()))
    }

    /// Number of recorded users
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn lookup(&self, user_id: &str) -> Result<Option<String>> {
        let session_id = self
            .conn()?
            .query_row(
                "SELECT session_id FROM threads WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(session_id)
    }

    async fn store(&self, user_id: &str, session_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?.execute(
            "INSERT INTO threads (user_id, session_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                session_id = excluded.session_id,
                updated_at = excluded.updated_at",
            params![user_id, session_id, now],
        )?;
        debug!("Stored thread {} for {}", session_id, user_id);
        Ok(())
    }
}
