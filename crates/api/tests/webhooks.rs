//! HTTP-level tests for the webhook and billing endpoints.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use craftpass_api::{create_router, AppState, Config};
use craftpass_billing::{
    BillingService, LemonClient, LemonConfig, MemoryProfileStore, ProfileStore, StripeClient,
    StripeConfig,
};
use craftpass_shared::{MembershipProfile, MembershipTier, PaymentProvider};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

const LEMON_SECRET: &str = "test-lemon-secret";

fn test_app(store: Arc<MemoryProfileStore>) -> axum::Router {
    let stripe = StripeClient::new(StripeConfig {
        secret_key: "sk_test_1".to_string(),
        webhook_secret: "whsec_test".to_string(),
        price_ids: craftpass_billing::client::PriceIds {
            monthly: "price_m".to_string(),
            yearly: "price_y".to_string(),
            credits10: None,
        },
        app_url: "http://localhost:3000".to_string(),
    });
    let lemon = LemonClient::new(LemonConfig {
        api_key: "ls_test".to_string(),
        store_id: "1".to_string(),
        webhook_secret: LEMON_SECRET.to_string(),
        variant_id_monthly: None,
        variant_id_yearly: None,
        variant_id_credits10: None,
        credit_variants: std::collections::HashMap::new(),
        api_url: "http://127.0.0.1:1".to_string(),
    });
    let billing = Arc::new(BillingService::new(stripe, lemon, store));

    // The webhook and billing paths never touch the pool directly; a lazy
    // pool satisfies the state without a running database.
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/craftpass_test")
        .unwrap();
    let config = Config {
        database_url: "postgres://localhost/craftpass_test".to_string(),
        bind_address: "127.0.0.1:0".to_string(),
        app_url: "http://localhost:3000".to_string(),
    };
    create_router(AppState::new(pool, config, billing))
}

fn sign_lemon(payload: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(LEMON_SECRET.as_bytes()).unwrap();
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let app = test_app(Arc::new(MemoryProfileStore::default()));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn verified_lemon_webhook_returns_received_and_updates_state() {
    let store = Arc::new(MemoryProfileStore::default());
    store
        .upsert(&MembershipProfile::new("user_1"))
        .await
        .unwrap();
    store
        .link_provider_customer("user_1", PaymentProvider::LemonSqueezy, "42", None, None)
        .await
        .unwrap();
    let app = test_app(store.clone());

    let payload = json!({
        "meta": { "event_name": "subscription_created" },
        "data": {
            "type": "subscriptions",
            "id": "sub_1",
            "attributes": {
                "customer_id": 42,
                "product_name": "Craftpass",
                "variant_name": "Pro Monthly",
                "status": "active"
            }
        }
    })
    .to_string();

    let response = app
        .oneshot(
            Request::post("/api/lemonsqueezy/webhooks")
                .header("X-Signature", sign_lemon(&payload))
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "received": true }));

    let profile = store.find_by_user_id("user_1").await.unwrap().unwrap();
    assert_eq!(profile.membership, MembershipTier::Pro);
}

#[tokio::test]
async fn invalid_lemon_signature_returns_400() {
    let app = test_app(Arc::new(MemoryProfileStore::default()));
    let payload = json!({ "meta": { "event_name": "subscription_created" } }).to_string();

    let response = app
        .oneshot(
            Request::post("/api/lemonsqueezy/webhooks")
                .header("X-Signature", "deadbeef")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_non_json_lemon_body_returns_400() {
    let app = test_app(Arc::new(MemoryProfileStore::default()));
    let payload = "this is not json";

    let response = app
        .oneshot(
            Request::post("/api/lemonsqueezy/webhooks")
                .header("X-Signature", sign_lemon(payload))
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_stripe_signature_returns_400() {
    let app = test_app(Arc::new(MemoryProfileStore::default()));
    let response = app
        .oneshot(
            Request::post("/api/stripe/webhooks")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_rejects_empty_user_id() {
    let app = test_app(Arc::new(MemoryProfileStore::default()));
    let response = app
        .oneshot(
            Request::post("/api/billing/checkout")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "user_id": "", "provider": "stripe", "plan": "monthly" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn portal_for_unknown_user_returns_404() {
    let app = test_app(Arc::new(MemoryProfileStore::default()));
    let response = app
        .oneshot(
            Request::post("/api/billing/portal")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "user_id": "ghost" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
