use std::collections::BTreeSet;
#[cfg(test)]
use std::collections::HashMap;
use std::path::Path;
#[cfg(test)]
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

pub const DB_PATH: &str = "data/leads.sqlite";

pub const LEAD_HASHES: &str = "leadHashes";
pub const PROCESSED_FILTERS: &str = "processedFilters";

/// Named string sets, always read and written whole.
pub trait SetStore: Send {
    fn load_set(&self, key: &str) -> Result<BTreeSet<String>>;
    fn save_set(&self, key: &str, set: &BTreeSet<String>) -> Result<()>;
}

// ── SQLite ──

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv_sets (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

impl SetStore for SqliteStore {
    fn load_set(&self, key: &str) -> Result<BTreeSet<String>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv_sets WHERE key = ?1", [key], |r| r.get(0))
            .optional()?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("Corrupt set stored under {:?}", key)),
            None => Ok(BTreeSet::new()),
        }
    }

    fn save_set(&self, key: &str, set: &BTreeSet<String>) -> Result<()> {
        let json = serde_json::to_string(set)?;
        self.conn.execute(
            "INSERT INTO kv_sets (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            rusqlite::params![key, json],
        )?;
        Ok(())
    }
}

// ── In memory ──

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set<I, S>(self, key: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), items.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
impl SetStore for MemoryStore {
    fn load_set(&self, key: &str) -> Result<BTreeSet<String>> {
        let sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sets.get(key).cloned().unwrap_or_default())
    }

    fn save_set(&self, key: &str, set: &BTreeSet<String>) -> Result<()> {
        let mut sets = self.sets.lock().unwrap_or_else(|e| e.into_inner());
        sets.insert(key.to_string(), set.clone());
        Ok(())
    }
}
