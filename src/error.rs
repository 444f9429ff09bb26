//! Error types for the devicegate service

use thiserror::Error;

/// Result type alias for devicegate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling a device check or webhook
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad or missing input: no imei, unknown service tier, missing transfer code
    #[error("{0}")]
    Validation(String),

    /// Webhook credential mismatch
    #[error("unauthorized")]
    Unauthorized,

    /// Payment not found for the presented code, or amount below the tier price
    #[error("{0}")]
    InvalidPayment(String),

    /// The transfer code has already been redeemed
    #[error("transfer code already used")]
    AlreadyUsed,

    /// Another request holds the consumption lock for this code; retry later
    #[error("transfer code is being processed by another request")]
    LockContended,

    /// Transport-level failure reaching the upstream verification API
    #[error("{0}")]
    Network(String),

    /// The upstream verification API rejected the lookup
    #[error("{0}")]
    Upstream(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
