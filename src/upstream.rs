//! Upstream device verification API client

use async_trait::async_trait;
use serde_json::Value;

use crate::{Error, Result};

/// Remote device lookup
///
/// The single point of contact with the paid verification API. Behind a
/// trait so tests can substitute a counting or failing fake.
#[async_trait]
pub trait DeviceLookup: Send + Sync {
    /// Look up device data for an IMEI at the given service tier
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] on transport failure or a non-success HTTP
    /// status, and [`Error::Upstream`] when the API reports a failed lookup.
    async fn lookup(&self, imei: &str, service: u32) -> Result<Value>;
}

/// Upstream lookup response envelope
#[derive(Debug, serde::Deserialize)]
struct LookupResponse {
    success: bool,
    object: Option<Value>,
    error: Option<String>,
}

/// Device lookup client for the upstream verification API
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl UpstreamClient {
    /// Create a new upstream client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(url: String, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "upstream API key required for device lookups".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url,
            api_key,
        })
    }
}

#[async_trait]
impl DeviceLookup for UpstreamClient {
    async fn lookup(&self, imei: &str, service: u32) -> Result<Value> {
        let form = [
            ("service", service.to_string()),
            ("imei", imei.to_string()),
            ("key", self.api_key.clone()),
        ];

        let response = self
            .client
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Network(format!("network connection failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Network(format!(
                "HTTP {status}: API service unavailable"
            )));
        }

        let result: LookupResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("invalid upstream response: {e}")))?;

        if !result.success {
            return Err(Error::Upstream(
                result.error.unwrap_or_else(|| "invalid request".to_string()),
            ));
        }

        result
            .object
            .ok_or_else(|| Error::Upstream("upstream returned no device data".to_string()))
    }
}
