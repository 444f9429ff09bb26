//! Payment provider webhook endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::ApiState;
use crate::ledger::IngestOutcome;

/// Handle a payment notification
///
/// Authentication failure is the only non-success response; once the shared
/// secret checks out, the transport is always told 200 "OK" whether the
/// payload was accepted, malformed, or a duplicate redelivery, so the
/// provider never retries on business-logic outcomes.
pub async fn handle_payment(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(notification): Json<Value>,
) -> Response {
    tracing::debug!(payload = %notification, "payment webhook received");

    if !is_valid_api_key(&headers, &state.webhook_api_key) {
        tracing::error!("invalid webhook API key");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    match state.ledger.ingest(&notification) {
        IngestOutcome::Accepted => {}
        IngestOutcome::Duplicate => tracing::warn!("duplicate payment notification dropped"),
        IngestOutcome::Rejected(reason) => {
            tracing::warn!(reason, "payment notification rejected");
        }
    }

    (StatusCode::OK, "OK").into_response()
}

/// Check the `Authorization: Apikey <value>` header against the shared secret
fn is_valid_api_key(headers: &HeaderMap, expected: &SecretString) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Apikey "))
        .is_some_and(|key| key == expected.expose_secret())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_valid_api_key() {
        let expected = SecretString::new("hook-secret".into());
        assert!(is_valid_api_key(
            &headers_with("Apikey hook-secret"),
            &expected
        ));
    }

    #[test]
    fn test_invalid_api_key() {
        let expected = SecretString::new("hook-secret".into());

        assert!(!is_valid_api_key(&HeaderMap::new(), &expected));
        assert!(!is_valid_api_key(&headers_with("Apikey wrong"), &expected));
        // Wrong scheme
        assert!(!is_valid_api_key(
            &headers_with("Bearer hook-secret"),
            &expected
        ));
    }
}
