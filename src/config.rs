//! Configuration management for the devicegate service

use std::collections::HashMap;

use secrecy::SecretString;

use crate::{Error, Result};

/// A priced service tier
///
/// Tier `0` is the free check; every other tier requires a payment whose
/// amount covers `price`.
#[derive(Debug, Clone)]
pub struct ServiceTier {
    /// Human-readable tier name
    pub name: String,

    /// Price in the payment provider's smallest currency unit
    pub price: u32,
}

/// Devicegate service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream verification API endpoint
    pub upstream_url: String,

    /// Credential sent with every upstream lookup
    pub upstream_api_key: String,

    /// Shared secret expected on payment webhook requests
    pub webhook_api_key: SecretString,

    /// Supported payment-code service families (3-letter prefixes)
    pub service_families: Vec<String>,

    /// Service tier price table, keyed by tier id
    pub tiers: HashMap<u32, ServiceTier>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `DEVICEGATE_UPSTREAM_KEY` or
    /// `DEVICEGATE_WEBHOOK_KEY` is not set.
    pub fn from_env() -> Result<Self> {
        let upstream_url = std::env::var("DEVICEGATE_UPSTREAM_URL")
            .unwrap_or_else(|_| "https://api.ifreeicloud.co.uk".to_string());

        let upstream_api_key = std::env::var("DEVICEGATE_UPSTREAM_KEY")
            .map_err(|_| Error::Config("DEVICEGATE_UPSTREAM_KEY is required".to_string()))?;

        let webhook_api_key = std::env::var("DEVICEGATE_WEBHOOK_KEY")
            .map_err(|_| Error::Config("DEVICEGATE_WEBHOOK_KEY is required".to_string()))?;

        let service_families = std::env::var("DEVICEGATE_SERVICE_FAMILIES")
            .map_or_else(
                |_| vec!["MDM".to_string()],
                |v| v.split(',').map(|s| s.trim().to_uppercase()).collect(),
            );

        Ok(Self {
            upstream_url,
            upstream_api_key,
            webhook_api_key: SecretString::new(webhook_api_key.into()),
            service_families,
            tiers: default_tiers(),
        })
    }
}

/// Built-in service tier price table
#[must_use]
pub fn default_tiers() -> HashMap<u32, ServiceTier> {
    HashMap::from([
        (
            0,
            ServiceTier {
                name: "Free Check".to_string(),
                price: 0,
            },
        ),
        (
            281,
            ServiceTier {
                name: "Full Check (Ultimate)".to_string(),
                price: 25_000,
            },
        ),
    ])
}
