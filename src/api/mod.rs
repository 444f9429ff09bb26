//! HTTP API server for the devicegate service

pub mod check;
pub mod health;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::CacheResolver;
use crate::config::{Config, ServiceTier};
use crate::db::{DbPool, KvStore};
use crate::ledger::PaymentLedger;
use crate::lock::ConsumptionLock;
use crate::redeem::RedemptionOrchestrator;
use crate::upstream::DeviceLookup;
use crate::Result;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub ledger: PaymentLedger,
    pub orchestrator: RedemptionOrchestrator,
    pub tiers: HashMap<u32, ServiceTier>,
    pub webhook_api_key: SecretString,
}

impl ApiState {
    /// Wire the component graph over a database pool and upstream client
    #[must_use]
    pub fn new(db: DbPool, config: &Config, upstream: Arc<dyn DeviceLookup>) -> Self {
        let kv = KvStore::new(db.clone());
        let ledger = PaymentLedger::new(kv.clone(), config.service_families.clone());
        let lock = ConsumptionLock::new(db.clone());
        let resolver = CacheResolver::new(kv, upstream);
        let orchestrator = RedemptionOrchestrator::new(
            ledger.clone(),
            lock,
            resolver,
            config.tiers.clone(),
        );

        Self {
            db,
            ledger,
            orchestrator,
            tiers: config.tiers.clone(),
            webhook_api_key: config.webhook_api_key.clone(),
        }
    }
}

/// Build the router with all routes and layers
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    let routes = Router::new()
        .route("/api/check", post(check::check_device))
        .route("/hooks/payment", post(webhook::handle_payment))
        .with_state(state.clone())
        .merge(health::router())
        .merge(health::ready_router(state));

    // CORS layer for cross-origin requests from frontend clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes.layer(cors).layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Create a new API server
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(state: Arc<ApiState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
