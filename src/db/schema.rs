//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Durable key-value entries: payment records (key = code),
        -- usage records (key = 'used_' || code), and the device-data
        -- cache (key = imei || '_' || service). Insert-only except for
        -- cache overwrites with an equal value.
        CREATE TABLE IF NOT EXISTS kv_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- In-flight redemption locks. The PRIMARY KEY is the uniqueness
        -- constraint that makes acquire an atomic insert-if-absent.
        CREATE TABLE IF NOT EXISTS payment_locks (
            transfer_code TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1 (kv entries, payment locks)");
    Ok(())
}
