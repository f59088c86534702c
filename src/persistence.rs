use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::Result;
use crate::export::StateBundle;

/// Key the dashboard state is stored under
pub const STATE_KEY: &str = "dashboard-state";

/// Local key/value storage backed by a single SQLite table
pub struct StateRepository {
    conn: Connection,
}

impl StateRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    pub fn save_state(&self, bundle: &StateBundle) -> Result<()> {
        let json = serde_json::to_string(bundle)?;
        self.set(STATE_KEY, &json)?;
        debug!(records = bundle.records.len(), "state saved");
        Ok(())
    }

    /// The saved bundle, or `None` when nothing has been saved yet
    pub fn load_state(&self) -> Result<Option<StateBundle>> {
        match self.get(STATE_KEY)? {
            Some(json) => Ok(Some(StateBundle::parse(&json)?)),
            None => Ok(None),
        }
    }
}
