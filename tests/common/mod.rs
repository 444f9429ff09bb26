//! Shared test utilities

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Value};

use devicegate::api::ApiState;
use devicegate::config::default_tiers;
use devicegate::{db, Config, DbPool, DeviceLookup, Error, Result};

/// Webhook shared secret used by test configs
pub const WEBHOOK_KEY: &str = "test-webhook-key";

/// Counting fake for the upstream verification API
pub struct MockUpstream {
    calls: AtomicUsize,
    fail: bool,
}

impl MockUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceLookup for MockUpstream {
    async fn lookup(&self, imei: &str, service: u32) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        // Yield so concurrent requests interleave at the fetch step
        tokio::task::yield_now().await;

        if self.fail {
            return Err(Error::Network("network connection failed".to_string()));
        }

        Ok(json!({ "imei": imei, "service": service, "status": "clean" }))
    }
}

/// Test configuration with the built-in tier table
pub fn test_config() -> Config {
    Config {
        upstream_url: "http://127.0.0.1:0".to_string(),
        upstream_api_key: "test-upstream-key".to_string(),
        webhook_api_key: SecretString::new(WEBHOOK_KEY.into()),
        service_families: vec!["MDM".to_string()],
        tiers: default_tiers(),
    }
}

/// Set up an in-memory test database
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Build API state over a fresh in-memory database
pub fn build_state(upstream: Arc<MockUpstream>) -> Arc<ApiState> {
    build_state_with(setup_test_db(), upstream)
}

/// Build API state over a given pool (to model multiple process instances)
pub fn build_state_with(pool: DbPool, upstream: Arc<MockUpstream>) -> Arc<ApiState> {
    Arc::new(ApiState::new(pool, &test_config(), upstream))
}
