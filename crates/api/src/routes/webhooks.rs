//! Webhook endpoints
//!
//! Both endpoints take the raw body as a string because signature
//! verification runs over the exact bytes the provider signed; any
//! re-serialization would break it. A handled delivery answers
//! `{"received": true}` whether it changed state or was ignored.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = header_str(&headers, "stripe-signature");
    let outcome = state
        .billing
        .webhooks
        .handle_stripe(&body, signature)
        .await?;
    tracing::debug!(?outcome, "Stripe webhook handled");
    Ok(Json(json!({ "received": true })))
}

pub async fn lemon_squeezy_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = header_str(&headers, "x-signature");
    let outcome = state
        .billing
        .webhooks
        .handle_lemon_squeezy(&body, signature)
        .await?;
    tracing::debug!(?outcome, "Lemon Squeezy webhook handled");
    Ok(Json(json!({ "received": true })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
