//! Durable key-value store over the `kv_entries` table

use chrono::Utc;

use super::DbPool;
use crate::{Error, Result};

/// Durable key-value store
///
/// Holds payment records, usage records, and the durable tier of the
/// device-data cache. Values are opaque strings (JSON in practice).
#[derive(Clone)]
pub struct KvStore {
    pool: DbPool,
}

impl KvStore {
    /// Create a new key-value store over the pool
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Read a value by key
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let value: Option<String> = conn
            .query_row("SELECT value FROM kv_entries WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .ok();

        Ok(value)
    }

    /// Write a value, overwriting any existing entry
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO kv_entries (key, value, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            [key, value, &now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Write a value only if the key is absent; first write wins
    ///
    /// Returns `true` if the value was written, `false` if an entry already
    /// existed for the key.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO kv_entries (key, value, created_at) VALUES (?1, ?2, ?3)",
                [key, value, &now],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(inserted > 0)
    }
}
