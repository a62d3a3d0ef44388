//! Durable session state, one JSON row per session

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{OrchestratorError, Result};
use crate::orchestrator::OrchestratorState;

/// SQLite-backed store for suspended and completed session states
#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open session db at {:?}", path.as_ref()))
            .map_err(OrchestratorError::Session)?;
        Self::init(conn)
    }

    /// In-memory store, for tests and throwaway sessions
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory session db")
            .map_err(OrchestratorError::Session)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create sessions table")
        .map_err(OrchestratorError::Session)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn load(&self, session_id: &str) -> Result<Option<OrchestratorState>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT state FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to load session")
            .map_err(OrchestratorError::Session)?;
        match raw {
            Some(raw) => {
                let state = serde_json::from_str(&raw)
                    .context("Failed to deserialize session state")
                    .map_err(OrchestratorError::Session)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub fn save(&self, session_id: &str, state: &OrchestratorState) -> Result<()> {
        let raw = serde_json::to_string(state)
            .context("Failed to serialize session state")
            .map_err(OrchestratorError::Session)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET state = ?2, updated_at = ?3",
            params![session_id, raw, chrono::Utc::now().to_rfc3339()],
        )
        .context("Failed to save session")
        .map_err(OrchestratorError::Session)?;
        debug!("Saved session {}", session_id);
        Ok(())
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
            .context("Failed to delete session")
            .map_err(OrchestratorError::Session)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id FROM sessions ORDER BY updated_at DESC")
            .context("Failed to prepare session list")
            .map_err(OrchestratorError::Session)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .and_then(|rows| rows.collect::<std::result::Result<Vec<String>, _>>())
            .context("Failed to list sessions")
            .map_err(OrchestratorError::Session)?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    #[test]
    fn test_missing_session_is_none() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let store = SessionStore::open_in_memory().unwrap();
        let mut state = OrchestratorState::default();
        state.messages.push(Message::human("book a meeting"));
        store.save("s1", &state).unwrap();

        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages.messages()[0].content, "book a meeting");
    }

    #[test]
    fn test_save_overwrites() {
        let store = SessionStore::open_in_memory().unwrap();
        let mut state = OrchestratorState::default();
        store.save("s1", &state).unwrap();
        state.messages.push(Message::human("one"));
        store.save("s1", &state).unwrap();
        assert_eq!(store.load("s1").unwrap().unwrap().messages.len(), 1);
        assert_eq!(store.list().unwrap(), vec!["s1".to_string()]);
    }

    #[test]
    fn test_delete() {
        let store = SessionStore::open_in_memory().unwrap();
        store.save("s1", &OrchestratorState::default()).unwrap();
        store.delete("s1").unwrap();
        assert!(store.load("s1").unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        {
            let store = SessionStore::open(&path).unwrap();
            store.save("s1", &OrchestratorState::default()).unwrap();
        }
        let store = SessionStore::open(&path).unwrap();
        assert!(store.load("s1").unwrap().is_some());
    }
}
