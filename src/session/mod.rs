//! Session stores holding sealed token bundles.
//!
//! The token manager never keeps a bundle between calls: every call reads the
//! sealed bytes back from a [`SessionStore`], so the store is the only shared
//! mutable state. Implementations only ever see ciphertext.

use anyhow::Result;
use dashmap::DashMap;

mod sqlite;

pub use sqlite::SqliteSessionStore;

/// Key/value store for opaque session payloads.
pub trait SessionStore: Send + Sync {
    /// Returns the stored bytes for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store. Sessions are lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
