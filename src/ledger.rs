//! Payment ledger: idempotent webhook ingestion and usage records

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};

use crate::db::KvStore;
use crate::Result;

/// Payment code shape: 3-letter service family, 8 digits, 4 alphanumerics
static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{3}[0-9]{8}[A-Za-z0-9]{4}$").expect("payment code pattern is valid")
});

/// An ingested payment notification
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    /// Payment code, the record's identity key
    pub code: String,

    /// Payment value reported by the provider
    pub transfer_amount: f64,

    /// The raw notification payload, preserved for audit
    pub raw: Value,
}

/// Outcome of ingesting a payment notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new payment record was persisted
    Accepted,
    /// A record for this code already exists; the redelivery was dropped
    Duplicate,
    /// The notification was malformed and no record was created
    Rejected(&'static str),
}

/// Payment ledger over the durable key-value store
///
/// Owns payment records (key = code, first-write-wins, never mutated or
/// deleted) and usage records (key = `used_<code>`, written exactly once on
/// successful redemption).
#[derive(Clone)]
pub struct PaymentLedger {
    kv: KvStore,
    service_families: Vec<String>,
}

impl PaymentLedger {
    /// Create a new ledger accepting codes from the given service families
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(kv: KvStore, service_families: Vec<String>) -> Self {
        Self {
            kv,
            service_families,
        }
    }

    /// Whether `code` matches the required pattern and a supported family
    #[must_use]
    pub fn is_valid_code(&self, code: &str) -> bool {
        if !CODE_PATTERN.is_match(code) {
            return false;
        }
        let family = code[..3].to_uppercase();
        self.service_families.contains(&family)
    }

    /// Ingest a payment notification
    ///
    /// Duplicate deliveries and malformed payloads are dropped, not errors:
    /// the webhook transport may redeliver and must be acknowledged either
    /// way. A persistence failure is logged and still reported as accepted,
    /// so the provider is never driven into an indefinite retry loop by a
    /// transient storage hiccup.
    #[must_use]
    pub fn ingest(&self, notification: &Value) -> IngestOutcome {
        let Some(code) = notification.get("code").and_then(Value::as_str) else {
            return IngestOutcome::Rejected("missing payment code");
        };

        if !self.is_valid_code(code) {
            return IngestOutcome::Rejected("invalid payment code pattern");
        }

        match self.kv.put_if_absent(code, &notification.to_string()) {
            Ok(true) => {
                tracing::info!(%code, "payment saved");
                IngestOutcome::Accepted
            }
            Ok(false) => IngestOutcome::Duplicate,
            Err(e) => {
                tracing::error!(%code, error = %e, "failed to save payment");
                IngestOutcome::Accepted
            }
        }
    }

    /// Look up a payment record by code
    ///
    /// A missing or non-numeric `transferAmount` reads as 0, which fails the
    /// price check for any paid tier.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn lookup(&self, code: &str) -> Result<Option<PaymentRecord>> {
        let Some(stored) = self.kv.get(code)? else {
            return Ok(None);
        };

        let raw: Value = serde_json::from_str(&stored)?;
        let transfer_amount = raw
            .get("transferAmount")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        Ok(Some(PaymentRecord {
            code: code.to_string(),
            transfer_amount,
            raw,
        }))
    }

    /// Whether a usage record exists for `code`
    ///
    /// Existence of the usage record is the sole authority for "already
    /// used", surviving process restarts.
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn is_used(&self, code: &str) -> Result<bool> {
        Ok(self.kv.get(&usage_key(code))?.is_some())
    }

    /// Record that `code` was redeemed for `(imei, service)`
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn mark_used(&self, code: &str, imei: &str, service: u32) -> Result<()> {
        let record = json!({
            "used_at": Utc::now().to_rfc3339(),
            "used_for_imei": imei,
            "used_for_service": service,
            "original_payment_key": code,
        });

        self.kv.put(&usage_key(code), &record.to_string())
    }
}

/// Usage-record key derived from a payment code
fn usage_key(code: &str) -> String {
    format!("used_{code}")
}
