use super::SettingsStore;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Settings kept in the `settings` table of the metadata database.
#[derive(Clone)]
pub struct SqliteSettingsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettingsStore {
    /// The connection must already carry the metadata schema.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get_int(&self, key: &str) -> Result<i64> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(0);
        };
        match raw.trim().parse::<i64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!("Setting {} holds non-integer value {:?}", key, raw);
                Ok(0)
            }
        }
    }

    fn set_int(&self, key: &str, value: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    fn key_exists(&self, key: &str) -> Result<bool> {
        Ok(self.get_raw(key)?.is_some())
    }
}
