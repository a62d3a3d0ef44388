//! SQLite persistence for user memories

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// A single stored memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// SQLite database wrapper (thread-safe via Arc<Mutex>)
pub struct MemoryDb {
    conn: Arc<Mutex<Connection>>,
}

impl MemoryDb {
    /// Open (or create) the memory database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening memory database at {:?}", path.as_ref());

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open memory database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);",
        )
        .context("Failed to initialize memory schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a new memory and return its generated id.
    /// Every call creates a fresh row; identical content is never merged.
    pub fn insert(&self, user_id: &str, content: &str) -> Result<Memory> {
        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().expect("memory db mutex poisoned");
        conn.execute(
            "INSERT INTO memories (id, user_id, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                memory.id,
                memory.user_id,
                memory.content,
                memory.created_at.to_rfc3339()
            ],
        )
        .context("Failed to insert memory")?;

        debug!("Stored memory {} for user {}", memory.id, user_id);
        Ok(memory)
    }

    /// Fetch a memory by id
    pub fn get(&self, id: &str) -> Result<Option<Memory>> {
        let conn = self.conn.lock().expect("memory db mutex poisoned");
        let row = conn
            .query_row(
                "SELECT id, user_id, content, created_at FROM memories WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query memory")?;

        Ok(row.map(|(id, user_id, content, created_at)| Memory {
            id,
            user_id,
            content,
            created_at: created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    /// All memories for a user, newest first
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Memory>> {
        let conn = self.conn.lock().expect("memory db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, content, created_at FROM memories
             WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut memories = Vec::new();
        for row in rows {
            let (id, user_id, content, created_at) = row?;
            memories.push(Memory {
                id,
                user_id,
                content,
                created_at: created_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
        Ok(memories)
    }

    /// Total number of stored memories
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("memory db mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
