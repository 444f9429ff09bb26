//! Three-tier device-data cache resolver

use std::sync::Arc;

use mini_moka::sync::Cache;
use serde_json::Value;

use crate::db::KvStore;
use crate::upstream::DeviceLookup;
use crate::Result;

/// Which tier satisfied a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Process-local cache hit
    Local,
    /// Durable key-value cache hit
    Durable,
    /// Fetched from the upstream verification API
    Upstream,
}

impl CacheSource {
    /// Tier name for logging
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Durable => "durable",
            Self::Upstream => "upstream",
        }
    }
}

/// Three-tier lookup for device data: process-local cache, durable
/// key-value cache, then the upstream API, with write-through population
/// on each miss.
///
/// Cached results are treated as permanent facts: there is no TTL and no
/// invalidation, and the local tier grows unboundedly for the life of the
/// process (a low-cardinality workload).
#[derive(Clone)]
pub struct CacheResolver {
    local: Cache<String, Value>,
    kv: KvStore,
    upstream: Arc<dyn DeviceLookup>,
}

impl CacheResolver {
    /// Create a new resolver over the durable store and upstream client
    #[must_use]
    pub fn new(kv: KvStore, upstream: Arc<dyn DeviceLookup>) -> Self {
        Self {
            local: Cache::builder().build(),
            kv,
            upstream,
        }
    }

    /// Resolve device data for `(imei, service)`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Network`] or [`crate::Error::Upstream`] when
    /// both cache tiers miss and the upstream call fails; no cache entry is
    /// written in that case.
    pub async fn resolve(&self, imei: &str, service: u32) -> Result<(Value, CacheSource)> {
        let key = cache_key(imei, service);

        if let Some(data) = self.local.get(&key) {
            tracing::debug!(%key, "device data from local cache");
            return Ok((data, CacheSource::Local));
        }

        if let Some(data) = self.durable_get(&key) {
            self.local.insert(key.clone(), data.clone());
            tracing::debug!(%key, "device data from durable cache");
            return Ok((data, CacheSource::Durable));
        }

        let data = self.upstream.lookup(imei, service).await?;

        self.local.insert(key.clone(), data.clone());
        match serde_json::to_string(&data) {
            Ok(raw) => {
                // The local entry already satisfies this request; a failed
                // durable write only costs a future upstream call.
                if let Err(e) = self.kv.put(&key, &raw) {
                    tracing::error!(%key, error = %e, "durable cache write failed");
                }
            }
            Err(e) => tracing::error!(%key, error = %e, "device data not serializable"),
        }

        tracing::debug!(%key, "device data from upstream");
        Ok((data, CacheSource::Upstream))
    }

    /// Read the durable tier, treating read or decode failures as a miss
    fn durable_get(&self, key: &str) -> Option<Value> {
        match self.kv.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(data) => Some(data),
                Err(e) => {
                    tracing::error!(%key, error = %e, "corrupt durable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!(%key, error = %e, "durable cache read failed");
                None
            }
        }
    }
}

/// Composite cache key for a device check
#[must_use]
pub fn cache_key(imei: &str, service: u32) -> String {
    format!("{imei}_{service}")
}
