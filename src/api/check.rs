//! Device check endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ApiState;
use crate::{Error, Result};

/// Device check request body
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub imei: Option<String>,
    #[serde(default)]
    pub service: u32,
    pub transfer_code: Option<String>,
}

/// Handle a device check: free tiers go straight to the cache chain, paid
/// tiers through payment redemption
pub async fn check_device(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CheckRequest>,
) -> Response {
    match handle(&state, request).await {
        Ok(data) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": data })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "device check failed");
            (status_for(&e), Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

async fn handle(state: &ApiState, request: CheckRequest) -> Result<Value> {
    let imei = request
        .imei
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation("IMEI is required".to_string()))?;

    let tier = state
        .tiers
        .get(&request.service)
        .ok_or_else(|| Error::Validation("service not supported".to_string()))?;

    if tier.price == 0 {
        tracing::info!(%imei, service = request.service, "free service request");
        return state.orchestrator.fulfill_free(&imei, request.service).await;
    }

    let code = request
        .transfer_code
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::Validation("transfer code is required for paid services".to_string())
        })?;

    state.orchestrator.redeem(&imei, request.service, &code).await
}

/// Map an error kind to its response status
///
/// A lock conflict gets a distinct 409 so clients can tell "retry later"
/// apart from terminal failures.
const fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_)
        | Error::InvalidPayment(_)
        | Error::AlreadyUsed
        | Error::Upstream(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::LockContended => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::Validation("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&Error::AlreadyUsed), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::LockContended), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Error::Network("down".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&Error::Upstream("rejected".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_request_decode_defaults() {
        let req: CheckRequest = serde_json::from_str(r#"{"imei": "123"}"#).unwrap();
        assert_eq!(req.imei.as_deref(), Some("123"));
        assert_eq!(req.service, 0);
        assert!(req.transfer_code.is_none());
    }
}
