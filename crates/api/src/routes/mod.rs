//! HTTP routes

pub mod billing;
pub mod webhooks;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/stripe/webhooks", post(webhooks::stripe_webhook))
        .route(
            "/api/lemonsqueezy/webhooks",
            post(webhooks::lemon_squeezy_webhook),
        )
        .route("/api/billing/checkout", post(billing::create_checkout))
        .route("/api/billing/portal", post(billing::customer_portal))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
