//! Webhook orchestration
//!
//! One handler per provider, each running the same pipeline: verify the
//! signature, classify the payload into a [`WebhookAction`], then dispatch
//! to the reconcile engine or the credit ledger. Dispatch is where the
//! duplicate-delivery policy lives: a replayed order is reported as handled,
//! an event for an unknown customer is a hard error so the provider retries
//! it after linking catches up.

use std::sync::Arc;

use craftpass_shared::PaymentProvider;

use crate::adapters::{LemonAdapter, StripeAdapter};
use crate::client::StripeClient;
use crate::credits::CreditLedger;
use crate::error::{BillingResult, LedgerError, LinkError, SignatureError};
use crate::events::{SubscriptionEventKind, WebhookAction};
use crate::lemon::LemonClient;
use crate::profiles::ProfileStore;
use crate::reconcile::ReconcileEngine;
use crate::signature::{verify_lemon_signature, verify_stripe_event};

/// What a delivery did, for logging and response shaping. Both variants
/// acknowledge the delivery; the distinction only matters to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Ignored,
}

pub struct WebhookHandler {
    stripe: StripeClient,
    lemon: LemonClient,
    stripe_adapter: StripeAdapter,
    lemon_adapter: LemonAdapter,
    engine: ReconcileEngine,
    ledger: CreditLedger,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, lemon: LemonClient, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            stripe_adapter: StripeAdapter::new(stripe.clone()),
            lemon_adapter: LemonAdapter::from_config(lemon.config()),
            engine: ReconcileEngine::new(store.clone()),
            ledger: CreditLedger::new(store),
            stripe,
            lemon,
        }
    }

    /// Handle a Stripe webhook delivery.
    pub async fn handle_stripe(
        &self,
        payload: &str,
        signature: &str,
    ) -> BillingResult<WebhookOutcome> {
        let secret = &self.stripe.config().webhook_secret;
        let event = verify_stripe_event(payload, signature, secret)?;

        tracing::debug!(event_type = %event.type_, event_id = %event.id, "Stripe webhook verified");
        let action = self.stripe_adapter.classify(&event).await?;
        self.dispatch(action).await
    }

    /// Handle a Lemon Squeezy webhook delivery.
    pub async fn handle_lemon_squeezy(
        &self,
        payload: &str,
        signature: &str,
    ) -> BillingResult<WebhookOutcome> {
        let secret = &self.lemon.config().webhook_secret;
        verify_lemon_signature(payload.as_bytes(), signature, secret)?;

        // A signed body that is not JSON is still a rejected delivery, not
        // an internal fault.
        let body: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        let action = self.lemon_adapter.classify(&body)?;
        self.dispatch(action).await
    }

    async fn dispatch(&self, action: WebhookAction) -> BillingResult<WebhookOutcome> {
        match action {
            WebhookAction::Subscription(event) => {
                self.engine.apply(&event).await?;
                Ok(WebhookOutcome::Processed)
            }
            WebhookAction::CheckoutCompleted {
                provider,
                user_id,
                subscription_id,
                provider_customer_id,
            } => {
                let Some(user_id) = user_id else {
                    // Checkout created outside our flow carries no user
                    // reference; logged and dropped, never retried.
                    tracing::warn!(
                        provider = %provider,
                        customer_id = %provider_customer_id,
                        error = %LinkError::MissingUserId,
                        "skipping link"
                    );
                    return Ok(WebhookOutcome::Ignored);
                };
                self.link_checkout(provider, &user_id, &subscription_id, &provider_customer_id)
                    .await?;
                Ok(WebhookOutcome::Processed)
            }
            WebhookAction::Credits {
                provider,
                user_id,
                amount,
                order_id,
            } => {
                let Some(user_id) = user_id else {
                    tracing::warn!(
                        provider = %provider,
                        order_id = %order_id,
                        "credits order without a user reference, skipping"
                    );
                    return Ok(WebhookOutcome::Ignored);
                };
                match self.ledger.apply(provider, &order_id, &user_id, amount).await {
                    Ok(_) => Ok(WebhookOutcome::Processed),
                    // Replays acknowledge cleanly so the provider stops
                    // redelivering.
                    Err(LedgerError::DuplicateOrder(order_key)) => {
                        tracing::info!(order_key = %order_key, "order already credited");
                        Ok(WebhookOutcome::Ignored)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            WebhookAction::Ignored => Ok(WebhookOutcome::Ignored),
        }
    }

    /// Link the provider customer minted at checkout, then pull the
    /// subscription's current state so membership is right immediately
    /// instead of waiting for the next lifecycle event.
    async fn link_checkout(
        &self,
        provider: PaymentProvider,
        user_id: &str,
        subscription_id: &str,
        provider_customer_id: &str,
    ) -> BillingResult<()> {
        match provider {
            PaymentProvider::Stripe => {
                self.engine
                    .link_customer(
                        user_id,
                        provider,
                        provider_customer_id,
                        Some(subscription_id),
                        None,
                    )
                    .await?;

                let subscription = self.stripe.get_subscription(subscription_id).await?;
                let event = self
                    .stripe_adapter
                    .canonical_from_subscription(&subscription, SubscriptionEventKind::Created)
                    .await?;
                self.engine.apply(&event).await?;
            }
            PaymentProvider::LemonSqueezy => {
                let portal_url = self
                    .lemon
                    .get_customer_portal_url(provider_customer_id)
                    .await;
                self.engine
                    .link_customer(
                        user_id,
                        provider,
                        provider_customer_id,
                        Some(subscription_id),
                        portal_url.as_deref(),
                    )
                    .await?;
                // Membership itself arrives on subscription_created, which
                // now has a linked customer to land on.
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BillingError;
    use crate::profiles::MemoryProfileStore;
    use craftpass_shared::{MembershipProfile, MembershipTier};
    use hmac::{Hmac, Mac};
    use serde_json::json;
    use sha2::Sha256;

    const LEMON_SECRET: &str = "test-lemon-secret";

    fn handler(store: Arc<MemoryProfileStore>) -> WebhookHandler {
        let stripe = StripeClient::new(crate::client::StripeConfig {
            secret_key: "sk_test_1".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_ids: crate::client::PriceIds {
                monthly: "price_m".to_string(),
                yearly: "price_y".to_string(),
                credits10: None,
            },
            app_url: "http://localhost:3000".to_string(),
        });
        let lemon = LemonClient::new(crate::lemon::LemonConfig {
            api_key: "ls_test".to_string(),
            store_id: "1".to_string(),
            webhook_secret: LEMON_SECRET.to_string(),
            variant_id_monthly: None,
            variant_id_yearly: None,
            variant_id_credits10: None,
            credit_variants: std::collections::HashMap::new(),
            api_url: "http://127.0.0.1:1".to_string(),
        });
        WebhookHandler::new(stripe, lemon, store)
    }

    fn sign_lemon(payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(LEMON_SECRET.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn subscription_payload(event_name: &str, status: &str) -> String {
        json!({
            "meta": { "event_name": event_name },
            "data": {
                "type": "subscriptions",
                "id": "sub_9",
                "attributes": {
                    "customer_id": 42,
                    "product_name": "Craftpass",
                    "variant_name": "Pro Monthly",
                    "status": status
                }
            }
        })
        .to_string()
    }

    async fn linked_store() -> Arc<MemoryProfileStore> {
        let store = Arc::new(MemoryProfileStore::default());
        store
            .upsert(&MembershipProfile::new("user_1"))
            .await
            .unwrap();
        store
            .link_provider_customer("user_1", PaymentProvider::LemonSqueezy, "42", None, None)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn bad_lemon_signature_is_rejected_before_any_work() {
        let store = Arc::new(MemoryProfileStore::default());
        let handler = handler(store.clone());
        let payload = subscription_payload("subscription_created", "active");

        let result = handler.handle_lemon_squeezy(&payload, "deadbeef").await;
        assert!(matches!(
            result,
            Err(BillingError::Signature(SignatureError::Mismatch))
        ));
        assert_eq!(store.profile_count(), 0);
    }

    #[tokio::test]
    async fn missing_stripe_signature_is_rejected() {
        let store = Arc::new(MemoryProfileStore::default());
        let handler = handler(store);
        let result = handler.handle_stripe("{}", "").await;
        assert!(matches!(
            result,
            Err(BillingError::Signature(SignatureError::Missing))
        ));
    }

    #[tokio::test]
    async fn verified_subscription_event_updates_membership() {
        let store = linked_store().await;
        let handler = handler(store.clone());
        let payload = subscription_payload("subscription_created", "active");

        let outcome = handler
            .handle_lemon_squeezy(&payload, &sign_lemon(&payload))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let profile = store.find_by_user_id("user_1").await.unwrap().unwrap();
        assert_eq!(profile.membership, MembershipTier::Pro);
        assert_eq!(
            profile.lemon_squeezy_subscription_id.as_deref(),
            Some("sub_9")
        );
    }

    #[tokio::test]
    async fn subscription_for_unlinked_customer_fails_without_creating_a_profile() {
        let store = Arc::new(MemoryProfileStore::default());
        let handler = handler(store.clone());
        let payload = subscription_payload("subscription_updated", "active");

        let result = handler
            .handle_lemon_squeezy(&payload, &sign_lemon(&payload))
            .await;
        assert!(matches!(result, Err(BillingError::Reconcile(_))));
        assert_eq!(store.profile_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_credit_order_acknowledges_without_recrediting() {
        let store = linked_store().await;
        let handler = handler(store.clone());
        let payload = json!({
            "meta": { "event_name": "order_created" },
            "data": {
                "type": "orders",
                "id": "ord_7",
                "attributes": {
                    "customer_id": 42,
                    "custom_data": { "userId": "user_1" },
                    "first_order_item": {
                        "subscription_id": null,
                        "variant_name": "10 Credits",
                        "variant_id": 3
                    }
                }
            }
        })
        .to_string();
        let signature = sign_lemon(&payload);

        let first = handler
            .handle_lemon_squeezy(&payload, &signature)
            .await
            .unwrap();
        assert_eq!(first, WebhookOutcome::Processed);

        let second = handler
            .handle_lemon_squeezy(&payload, &signature)
            .await
            .unwrap();
        assert_eq!(second, WebhookOutcome::Ignored);

        let profile = store.find_by_user_id("user_1").await.unwrap().unwrap();
        assert_eq!(profile.credits, 10);
    }

    #[tokio::test]
    async fn signed_non_json_body_is_rejected_as_malformed() {
        let store = Arc::new(MemoryProfileStore::default());
        let handler = handler(store.clone());
        let payload = "this is not json";

        let result = handler.handle_lemon_squeezy(payload, &sign_lemon(payload)).await;
        assert!(matches!(
            result,
            Err(BillingError::Signature(SignatureError::Malformed(_)))
        ));
        assert_eq!(store.profile_count(), 0);
    }

    #[tokio::test]
    async fn subscription_order_without_user_reference_is_dropped() {
        let store = linked_store().await;
        let handler = handler(store.clone());
        let payload = json!({
            "meta": { "event_name": "order_created" },
            "data": {
                "type": "orders",
                "id": "ord_8",
                "attributes": {
                    "customer_id": 42,
                    "custom_data": null,
                    "first_order_item": {
                        "subscription_id": 9001,
                        "variant_name": "Pro Monthly",
                        "variant_id": 7
                    }
                }
            }
        })
        .to_string();

        let outcome = handler
            .handle_lemon_squeezy(&payload, &sign_lemon(&payload))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let profile = store.find_by_user_id("user_1").await.unwrap().unwrap();
        assert!(profile.lemon_squeezy_subscription_id.is_none());
    }

    #[tokio::test]
    async fn unknown_event_is_acknowledged_as_ignored() {
        let store = Arc::new(MemoryProfileStore::default());
        let handler = handler(store);
        let payload = json!({ "meta": { "event_name": "affiliate_activated" } }).to_string();
        let outcome = handler
            .handle_lemon_squeezy(&payload, &sign_lemon(&payload))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }
}
