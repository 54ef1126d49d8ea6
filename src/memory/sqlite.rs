//! SQLite-backed conversation log.
//!
//! Every exchange is stored as a `user` row and an `assistant` row. Recall
//! merges a full-text search over past messages with the most recent rows,
//! so the model sees both topical and conversational context.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tracing::{debug, warn};

use super::ConversationMemory;
use super::schema::apply_schema;
use crate::error::{ElysiaError, Result};

type StoreResult<T> = std::result::Result<T, SqliteMemoryError>;

/// Errors from the SQLite memory backend.
#[derive(Debug, thiserror::Error)]
pub enum SqliteMemoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

impl From<SqliteMemoryError> for ElysiaError {
    fn from(e: SqliteMemoryError) -> Self {
        ElysiaError::Memory(e.to_string())
    }
}

/// Persistent message log with full-text recall.
///
/// Cheap to clone; clones share one connection behind a mutex.
#[derive(Debug, Clone)]
pub struct SqliteMemory {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    recall_max_results: usize,
}

impl SqliteMemory {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path, recall_max_results: usize) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| SqliteMemoryError::Io(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        debug!(path = %path.display(), "memory database opened");
        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
            recall_max_results,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SqliteMemoryError::Lock(e.to_string()))
    }

    /// Append one message, returning its row id.
    pub fn add(&self, role: &str, content: &str) -> StoreResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages(ts, role, content) VALUES (?1, ?2, ?3)",
            params![now_epoch_secs_f64(), role, content],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The last `limit` messages, oldest first.
    pub fn recent(&self, limit: usize) -> StoreResult<Vec<(String, String)>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT role, content FROM messages ORDER BY id DESC LIMIT ?1")?;
        let mut rows = stmt
            .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Messages matching any word of `query`, newest `limit` of them,
    /// returned oldest first.
    ///
    /// Index failures degrade to no results.
    pub fn search(&self, query: &str, limit: usize) -> StoreResult<Vec<(String, String)>> {
        let Some(fts_query) = build_match_query(query) else {
            return Ok(Vec::new());
        };
        let conn = self.lock()?;
        let found = (|| -> rusqlite::Result<Vec<(String, String)>> {
            let mut stmt = conn.prepare(
                "SELECT m.role, m.content
                   FROM messages_fts f
                   JOIN messages m ON m.id = f.rowid
                  WHERE messages_fts MATCH ?1
                  ORDER BY m.id DESC
                  LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![fts_query, limit as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect();
            rows
        })();
        match found {
            Ok(mut rows) => {
                rows.reverse();
                Ok(rows)
            }
            Err(e) => {
                warn!("memory search failed for {fts_query:?}: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Search hits followed by recent messages, deduplicated by content and
    /// rendered as `[role] content` lines.
    pub fn retrieve(&self, query: &str, max_results: usize) -> StoreResult<String> {
        let hits = self.search(query, max_results)?;
        let recent = self.recent(max_results)?;
        let mut seen = std::collections::HashSet::new();
        let lines: Vec<String> = hits
            .into_iter()
            .chain(recent)
            .filter(|(_, content)| !content.is_empty() && seen.insert(content.clone()))
            .map(|(role, content)| format!("[{role}] {content}"))
            .collect();
        Ok(lines.join("\n"))
    }

    /// Store one exchange as a user row followed by an assistant row.
    pub fn store_exchange(&self, user: &str, assistant: &str) -> StoreResult<()> {
        self.add("user", user)?;
        self.add("assistant", assistant)?;
        Ok(())
    }

    /// Delete every message and its index entries. Returns the rows removed.
    pub fn clear(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM messages", [])?;
        conn.execute("INSERT INTO messages_fts(messages_fts) VALUES ('rebuild')", [])?;
        Ok(removed)
    }

    /// Number of stored messages.
    pub fn len(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT count(*) FROM messages", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl ConversationMemory for SqliteMemory {
    async fn recall(&self, query: &str) -> Result<String> {
        let store = self.clone();
        let query = query.to_owned();
        let max = self.recall_max_results;
        tokio::task::spawn_blocking(move || store.retrieve(&query, max))
            .await
            .map_err(|e| ElysiaError::Memory(format!("recall task failed: {e}")))?
            .map_err(Into::into)
    }

    async fn remember(&self, user: &str, assistant: &str) -> Result<()> {
        let store = self.clone();
        let user = user.to_owned();
        let assistant = assistant.to_owned();
        tokio::task::spawn_blocking(move || store.store_exchange(&user, &assistant))
            .await
            .map_err(|e| ElysiaError::Memory(format!("remember task failed: {e}")))?
            .map_err(Into::into)
    }
}

/// OR-join the alphanumeric words (two or more characters) of `query`.
///
/// Words are quoted so apostrophes and FTS operators in speech never reach
/// the query parser as syntax.
fn build_match_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

fn now_epoch_secs_f64() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
