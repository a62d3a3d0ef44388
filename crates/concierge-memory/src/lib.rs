//! Per-user memory store for the concierge assistant
//!
//! This crate provides:
//! - SQLite persistence for short text memories, keyed by user
//! - Tantivy relevance index for "memories of user" retrieval
//! - A combined [`MemoryStore`] facade used by the gmail sub-agent

pub mod index;
pub mod store;

pub use index::{MemoryHit, MemoryIndex};
pub use store::{Memory, MemoryDb};

use anyhow::Result;
use std::path::Path;
use tracing::debug;

/// Combined memory store: durable rows plus a ranked search index.
///
/// `put` never deduplicates; every call stores a fresh row under a new id.
pub struct MemoryStore {
    db: MemoryDb,
    index: MemoryIndex,
}

impl MemoryStore {
    /// Open (or create) the store under the given directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let db = MemoryDb::open(dir.join("memories.db"))?;
        let index = MemoryIndex::open(dir.join("index"))?;
        Ok(Self { db, index })
    }

    /// Store a new memory for a user and return its id
    pub fn put(&self, user_id: &str, content: &str) -> Result<String> {
        let memory = self.db.insert(user_id, content)?;
        self.index.index_memory(&memory.id, user_id, content)?;
        debug!("Put memory {} for user {}", memory.id, user_id);
        Ok(memory.id)
    }

    /// Search a user's memories, most relevant first, at most `limit` snippets
    pub fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<String>> {
        let hits = self.index.search(user_id, query, limit)?;
        Ok(hits.into_iter().map(|h| h.content).collect())
    }

    /// Number of memories stored across all users
    pub fn count(&self) -> Result<usize> {
        self.db.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_then_search() -> Result<()> {
        let dir = TempDir::new()?;
        let store = MemoryStore::open(dir.path())?;

        store.put("hhm", "remember that my wife's birthday is March 3rd")?;
        let results = store.search("hhm", "when is my wife's birthday", 2)?;

        assert!(!results.is_empty());
        assert!(results[0].contains("March 3rd"));
        Ok(())
    }

    #[test]
    fn test_put_is_not_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let store = MemoryStore::open(dir.path())?;

        let a = store.put("hhm", "remember I take the 8am train")?;
        let b = store.put("hhm", "remember I take the 8am train")?;

        assert_ne!(a, b);
        assert_eq!(store.count()?, 2);
        Ok(())
    }

    #[test]
    fn test_search_limit() -> Result<()> {
        let dir = TempDir::new()?;
        let store = MemoryStore::open(dir.path())?;

        store.put("hhm", "remember the wifi password is hunter2")?;
        store.put("hhm", "remember the office wifi is flaky")?;
        store.put("hhm", "remember to renew the wifi contract")?;

        let results = store.search("hhm", "wifi", 2)?;
        assert!(results.len() <= 2);
        Ok(())
    }
}
