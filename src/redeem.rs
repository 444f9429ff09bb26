//! Redemption orchestrator: consume a payment code for one device check

use std::collections::HashMap;

use serde_json::Value;

use crate::cache::CacheResolver;
use crate::config::ServiceTier;
use crate::ledger::PaymentLedger;
use crate::lock::ConsumptionLock;
use crate::{Error, Result};

/// Coordinates the payment ledger, consumption lock, and cache resolver so
/// that a valid payment code is applied to exactly one successful device
/// check.
///
/// A paid attempt runs strictly sequentially: validate payment → replay
/// check → acquire lock → usage recheck → fetch data → mark used. The lock
/// row is kept after a successful redemption and released on every failure
/// path, so a failed attempt (upstream down, storage hiccup) can be retried
/// with the same code while a completed one cannot.
#[derive(Clone)]
pub struct RedemptionOrchestrator {
    ledger: PaymentLedger,
    lock: ConsumptionLock,
    resolver: CacheResolver,
    tiers: HashMap<u32, ServiceTier>,
}

impl RedemptionOrchestrator {
    /// Create a new orchestrator over its collaborators
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(
        ledger: PaymentLedger,
        lock: ConsumptionLock,
        resolver: CacheResolver,
        tiers: HashMap<u32, ServiceTier>,
    ) -> Self {
        Self {
            ledger,
            lock,
            resolver,
            tiers,
        }
    }

    /// Redeem `code` for one device check at a paid tier
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an unknown service tier
    /// - [`Error::InvalidPayment`] when no payment exists for `code` or its
    ///   amount is below the tier price
    /// - [`Error::AlreadyUsed`] when a usage record exists for `code`
    /// - [`Error::LockContended`] when a concurrent attempt holds the lock;
    ///   the caller should retry later
    /// - [`Error::Network`] / [`Error::Upstream`] when the data fetch fails;
    ///   no usage record is written, so the same code remains redeemable
    pub async fn redeem(&self, imei: &str, service: u32, code: &str) -> Result<Value> {
        let price = self.price(service)?;
        self.validate_payment(code, price)?;

        // Replay check before taking the lock: a completed redemption keeps
        // its lock row as a tombstone, so a replayed code must surface as
        // already-used, not as contention.
        if self.ledger.is_used(code)? {
            return Err(Error::AlreadyUsed);
        }

        if !self.lock.acquire(code)? {
            return Err(Error::LockContended);
        }

        match self.fulfill(imei, service, code).await {
            Ok(data) => {
                // The lock row stays behind on success, a second guard
                // against reuse alongside the usage record.
                Ok(data)
            }
            Err(e) => {
                self.lock.release(code);
                Err(e)
            }
        }
    }

    /// Fulfill a free-tier check: cache chain only, no payment state touched
    ///
    /// The caller is responsible for dispatching only tiers priced at zero
    /// here.
    ///
    /// # Errors
    ///
    /// Returns error if the cache chain and upstream lookup both fail
    pub async fn fulfill_free(&self, imei: &str, service: u32) -> Result<Value> {
        let (data, source) = self.resolver.resolve(imei, service).await?;
        tracing::info!(%imei, service, source = source.as_str(), "free check fulfilled");
        Ok(data)
    }

    /// Steps that run while holding the consumption lock
    async fn fulfill(&self, imei: &str, service: u32, code: &str) -> Result<Value> {
        // Authoritative usage check, now serialized by the lock
        if self.ledger.is_used(code)? {
            return Err(Error::AlreadyUsed);
        }

        let (data, source) = self.resolver.resolve(imei, service).await?;

        // Only after the data fetch succeeded; a failure above leaves the
        // code redeemable.
        self.ledger.mark_used(code, imei, service)?;

        tracing::info!(
            %imei,
            service,
            source = source.as_str(),
            transfer_code = %code,
            "paid check fulfilled"
        );

        Ok(data)
    }

    /// Tier price lookup
    fn price(&self, service: u32) -> Result<u32> {
        self.tiers
            .get(&service)
            .map(|t| t.price)
            .ok_or_else(|| Error::Validation("service not supported".to_string()))
    }

    /// Payment must exist and cover the tier price
    fn validate_payment(&self, code: &str, price: u32) -> Result<()> {
        let Some(payment) = self.ledger.lookup(code)? else {
            return Err(Error::InvalidPayment(
                "invalid transfer code or payment not found".to_string(),
            ));
        };

        if payment.transfer_amount < f64::from(price) {
            return Err(Error::InvalidPayment(
                "payment amount insufficient for this service".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::config::default_tiers;
    use crate::db::{init_memory, KvStore};
    use crate::upstream::DeviceLookup;

    struct FakeUpstream {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DeviceLookup for FakeUpstream {
        async fn lookup(&self, imei: &str, service: u32) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Network("network connection failed".to_string()));
            }
            Ok(json!({ "imei": imei, "service": service, "status": "clean" }))
        }
    }

    struct Fixture {
        orchestrator: RedemptionOrchestrator,
        ledger: PaymentLedger,
        lock: ConsumptionLock,
        upstream: Arc<FakeUpstream>,
    }

    fn setup(fail_upstream: bool) -> Fixture {
        let pool = init_memory().unwrap();
        let kv = KvStore::new(pool.clone());
        let ledger = PaymentLedger::new(kv.clone(), vec!["MDM".to_string()]);
        let lock = ConsumptionLock::new(pool);
        let upstream = Arc::new(FakeUpstream {
            calls: AtomicUsize::new(0),
            fail: fail_upstream,
        });
        let resolver = CacheResolver::new(kv, upstream.clone());
        let orchestrator = RedemptionOrchestrator::new(
            ledger.clone(),
            lock.clone(),
            resolver,
            default_tiers(),
        );

        Fixture {
            orchestrator,
            ledger,
            lock,
            upstream,
        }
    }

    fn ingest_payment(ledger: &PaymentLedger, code: &str, amount: i64) {
        let outcome = ledger.ingest(&json!({ "code": code, "transferAmount": amount }));
        assert_eq!(outcome, crate::ledger::IngestOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_happy_path() {
        let fx = setup(false);
        ingest_payment(&fx.ledger, "MDM00000001ABCD", 25_000);

        let data = fx
            .orchestrator
            .redeem("999", 281, "MDM00000001ABCD")
            .await
            .unwrap();
        assert_eq!(data["status"], "clean");
        assert!(fx.ledger.is_used("MDM00000001ABCD").unwrap());

        // Success leaves the lock row behind
        assert!(!fx.lock.acquire("MDM00000001ABCD").unwrap());
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let fx = setup(false);

        let err = fx
            .orchestrator
            .redeem("999", 281, "MDM00000001ABCD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPayment(_)));
        assert_eq!(fx.upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_insufficient_amount() {
        let fx = setup(false);
        ingest_payment(&fx.ledger, "MDM00000001ABCD", 10_000);

        let err = fx
            .orchestrator
            .redeem("999", 281, "MDM00000001ABCD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPayment(_)));
    }

    #[tokio::test]
    async fn test_double_spend() {
        let fx = setup(false);
        ingest_payment(&fx.ledger, "MDM00000001ABCD", 25_000);

        fx.orchestrator
            .redeem("999", 281, "MDM00000001ABCD")
            .await
            .unwrap();

        let err = fx
            .orchestrator
            .redeem("999", 281, "MDM00000001ABCD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyUsed));

        // The replayed attempt never reached upstream
        assert_eq!(fx.upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lock_contention() {
        let fx = setup(false);
        ingest_payment(&fx.ledger, "MDM00000001ABCD", 25_000);

        // Another in-flight attempt holds the lock
        assert!(fx.lock.acquire("MDM00000001ABCD").unwrap());

        let err = fx
            .orchestrator
            .redeem("999", 281, "MDM00000001ABCD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockContended));
        assert!(!fx.ledger.is_used("MDM00000001ABCD").unwrap());
    }

    #[tokio::test]
    async fn test_upstream_failure_releases_lock() {
        let fx = setup(true);
        ingest_payment(&fx.ledger, "MDM00000001ABCD", 25_000);

        let err = fx
            .orchestrator
            .redeem("999", 281, "MDM00000001ABCD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));

        // No usage record was written and the lock was released,
        // so the same code is retryable
        assert!(!fx.ledger.is_used("MDM00000001ABCD").unwrap());
        assert!(fx.lock.acquire("MDM00000001ABCD").unwrap());
    }

    #[tokio::test]
    async fn test_usage_record_is_sole_authority() {
        let fx = setup(false);
        ingest_payment(&fx.ledger, "MDM00000001ABCD", 25_000);

        // Usage record without any lock row (as after a restart of another
        // instance): the attempt must fail as already-used, not contended.
        fx.ledger.mark_used("MDM00000001ABCD", "999", 281).unwrap();

        let err = fx
            .orchestrator
            .redeem("999", 281, "MDM00000001ABCD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_unknown_tier() {
        let fx = setup(false);

        let err = fx
            .orchestrator
            .redeem("999", 7, "MDM00000001ABCD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_free_path_touches_no_payment_state() {
        let fx = setup(false);

        let data = fx.orchestrator.fulfill_free("123", 0).await.unwrap();
        assert_eq!(data["status"], "clean");

        // Repeated free checks never fail due to prior state
        fx.orchestrator.fulfill_free("123", 0).await.unwrap();
        assert_eq!(fx.upstream.calls.load(Ordering::SeqCst), 1);
        assert!(fx.lock.acquire("MDM00000001ABCD").unwrap());
    }
}
