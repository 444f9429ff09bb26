//! Devicegate - payment-gated device verification gateway
//!
//! Brokers access to a paid, rate-limited device/IMEI verification API behind
//! a cached, idempotent façade. Free-tier checks go straight to the cache
//! chain; paid-tier checks must present a transfer code that was ingested
//! from a payment-provider webhook, and each code is redeemable exactly once
//! even under concurrent attempts across multiple process instances.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 HTTP API (axum)                      │
//! │   POST /api/check   │   POST /hooks/payment         │
//! └──────────┬──────────┴──────────┬────────────────────┘
//!            │                     │
//! ┌──────────▼──────────┐ ┌────────▼───────────┐
//! │ Redemption           │ │ Payment Ledger     │
//! │ Orchestrator         │ │ (ingest/lookup)    │
//! │ validate→lock→usage  │ └────────┬───────────┘
//! └──────────┬──────────┘          │
//! ┌──────────▼──────────────────────▼───────────────────┐
//! │   Cache Resolver: local → durable KV → upstream API  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod redeem;
pub mod upstream;

pub use cache::{CacheResolver, CacheSource};
pub use config::{Config, ServiceTier};
pub use db::{DbConn, DbPool, KvStore};
pub use error::{Error, Result};
pub use ledger::{IngestOutcome, PaymentLedger, PaymentRecord};
pub use lock::ConsumptionLock;
pub use redeem::RedemptionOrchestrator;
pub use upstream::{DeviceLookup, UpstreamClient};
