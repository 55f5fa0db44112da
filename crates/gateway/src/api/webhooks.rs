//! SuperU webhook endpoint.
//!
//! The route verifies `HMAC_SHA256(secret, "{timestamp}.{raw_body}")`
//! against `X-SuperU-Signature` (constant-time compare) and bounds the
//! timestamp skew before handing the payload to the ingestor.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::state::AppState;

use super::api_error;

type HmacSha256 = Hmac<Sha256>;

/// `POST /v1/voice/superu/callback`
pub async fn superu_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let secret = state.config.superu_webhook_secret.trim();
    if secret.is_empty() {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "webhook secret not configured");
    }

    let signature = headers
        .get("x-superu-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let timestamp_raw = headers
        .get("x-superu-timestamp")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let Ok(timestamp) = timestamp_raw.trim().parse::<i64>() else {
        return api_error(StatusCode::UNAUTHORIZED, "missing or invalid timestamp");
    };

    let skew = (chrono::Utc::now().timestamp() - timestamp).abs();
    if skew > state.config.superu_webhook_tolerance_seconds {
        return api_error(StatusCode::UNAUTHORIZED, "timestamp outside tolerance");
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp_raw.trim().as_bytes());
    mac.update(b".");
    mac.update(&body);
    let computed = hex::encode(mac.finalize().into_bytes());

    // Constant-time comparison to prevent timing attacks.
    if computed.as_bytes().ct_eq(signature.as_bytes()).unwrap_u8() != 1 {
        return api_error(StatusCode::UNAUTHORIZED, "invalid webhook signature");
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "body is not valid JSON"),
    };

    let result = state.voice.ingest_provider_callback(&payload);
    if !result.accepted {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!(result))).into_response();
    }
    Json(serde_json::json!(result)).into_response()
}
