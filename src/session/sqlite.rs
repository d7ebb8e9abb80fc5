//! SQLite-backed session store.

use super::SessionStore;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Persists sealed session payloads in SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE sessions (
///     key        TEXT PRIMARY KEY,
///     payload    BLOB NOT NULL,   -- sealed bundle, never plaintext
///     updated_at TEXT NOT NULL    -- RFC 3339
/// );
/// ```
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Opens (or creates) the database. `":memory:"` gives a private in-memory DB.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open session DB at {}", path.display()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                key        TEXT PRIMARY KEY,
                payload    BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .context("Failed to create sessions table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored sessions.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .context("Failed to count sessions")?;
        Ok(count as usize)
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT payload FROM sessions WHERE key = ?1",
            params![key],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .context("Failed to read session")
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (key, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 payload = excluded.payload,
                 updated_at = excluded.updated_at",
            params![key, value, now],
        )
        .context("Failed to store session")?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sessions WHERE key = ?1", params![key])
            .context("Failed to delete session")?;
        Ok(())
    }
}
