//! Consumption lock: cross-instance mutual exclusion per payment code

use chrono::Utc;
use rusqlite::ErrorCode;

use crate::db::DbPool;
use crate::{Error, Result};

/// Mutual exclusion for in-flight redemptions, one lock per payment code
///
/// `acquire` is an atomic insert-if-absent into the `payment_locks` table;
/// the PRIMARY KEY on `transfer_code` is what serializes concurrent attempts,
/// not any in-process synchronization, so the guarantee holds across process
/// instances sharing the database.
///
/// Locks have no expiry. A successful redemption leaves its lock row behind
/// as a tombstone; `release` is called only on failure paths so the same
/// code can be retried with a fresh attempt.
#[derive(Clone)]
pub struct ConsumptionLock {
    pool: DbPool,
}

impl ConsumptionLock {
    /// Create a new lock over the pool
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Try to take the lock for `code`
    ///
    /// Returns `true` if this caller now holds the lock, `false` if a
    /// concurrent attempt (or a completed redemption's tombstone) holds it.
    /// Does not block or retry; a losing caller fails fast.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails for any reason other than the
    /// uniqueness constraint. Lock integrity is the correctness backbone
    /// here, so storage failures on acquire are never swallowed.
    pub fn acquire(&self, code: &str) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        match conn.execute(
            "INSERT INTO payment_locks (transfer_code, created_at) VALUES (?1, ?2)",
            [code, &now],
        ) {
            Ok(_) => {
                tracing::info!(%code, "lock acquired");
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the lock for `code` so a later attempt can retry
    ///
    /// Failures are logged and swallowed: release happens on paths that are
    /// already returning an error to the caller, and a leaked lock row is an
    /// accepted operational risk rather than a reason to mask that error.
    pub fn release(&self, code: &str) {
        let result = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))
            .and_then(|conn| {
                conn.execute("DELETE FROM payment_locks WHERE transfer_code = ?1", [code])
                    .map_err(Error::from)
            });

        match result {
            Ok(_) => tracing::info!(%code, "lock released for retry"),
            Err(e) => tracing::error!(%code, error = %e, "failed to release lock"),
        }
    }
}
