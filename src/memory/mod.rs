//! Conversation memory.
//!
//! Sub-modules:
//! - `schema`: SQLite DDL for the message log and its full-text index.
//! - `sqlite`: [`SqliteMemory`], the persistent store.
//!
//! The response processor only sees [`ConversationMemory`]: recall returns
//! rendered context lines for the prompt and remember appends one exchange.

pub(crate) mod schema;
pub mod sqlite;

pub use sqlite::{SqliteMemory, SqliteMemoryError};

use async_trait::async_trait;

use crate::error::Result;

/// Memory collaborator used by the response processor.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Context relevant to `query`, rendered as `[role] content` lines.
    ///
    /// An empty string means nothing relevant was found.
    async fn recall(&self, query: &str) -> Result<String>;

    /// Persist one exchange.
    async fn remember(&self, user: &str, assistant: &str) -> Result<()>;
}

/// Memory that stores nothing and recalls nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemory;

#[async_trait]
impl ConversationMemory for NoMemory {
    async fn recall(&self, _query: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn remember(&self, _user: &str, _assistant: &str) -> Result<()> {
        Ok(())
    }
}
