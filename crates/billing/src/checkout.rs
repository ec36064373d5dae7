//! Checkout session creation
//!
//! Builds provider-hosted checkout links. The user id always rides along
//! with the session (Stripe client_reference_id, Lemon Squeezy checkout
//! custom data) so the completion webhook can link the minted customer back
//! to the profile.

use std::collections::HashMap;

use craftpass_shared::PaymentProvider;
use serde::{Deserialize, Serialize};
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionPaymentIntentData,
};

use crate::client::{StripeClient, StripeConfig};
use crate::error::{BillingError, BillingResult};
use crate::lemon::{CreateLemonCheckout, LemonClient, LemonConfig};

/// What the user is buying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Monthly,
    Yearly,
    Credits,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutLink {
    pub url: String,
}

pub struct CheckoutService {
    stripe: StripeClient,
    lemon: LemonClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, lemon: LemonClient) -> Self {
        Self { stripe, lemon }
    }

    /// Create a hosted checkout session and return its URL.
    pub async fn create(
        &self,
        provider: PaymentProvider,
        plan: PlanType,
        user_id: &str,
    ) -> BillingResult<CheckoutLink> {
        match provider {
            PaymentProvider::Stripe => self.create_stripe(plan, user_id).await,
            PaymentProvider::LemonSqueezy => self.create_lemon(plan, user_id).await,
        }
    }

    async fn create_stripe(&self, plan: PlanType, user_id: &str) -> BillingResult<CheckoutLink> {
        let config = self.stripe.config();
        let success_url = format!("{}/billing?checkout=success", config.app_url);
        let cancel_url = format!("{}/billing?checkout=cancelled", config.app_url);
        let price = stripe_price(config, plan)?;

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.client_reference_id = Some(user_id);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price.to_string()),
            quantity: Some(1),
            ..Default::default()
        }]);

        if plan == PlanType::Credits {
            params.mode = Some(CheckoutSessionMode::Payment);
            // payment_intent.succeeded carries this metadata back to the
            // webhook, which credits the balance from it.
            params.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
                metadata: Some(credits_intent_metadata(user_id)),
                ..Default::default()
            });
        } else {
            params.mode = Some(CheckoutSessionMode::Subscription);
        }

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;
        let url = session
            .url
            .ok_or_else(|| BillingError::Internal("checkout session has no url".to_string()))?;

        tracing::info!(user_id = %user_id, plan = ?plan, "created Stripe checkout session");
        Ok(CheckoutLink { url })
    }

    async fn create_lemon(&self, plan: PlanType, user_id: &str) -> BillingResult<CheckoutLink> {
        let variant_id = lemon_variant(self.lemon.config(), plan).ok_or_else(|| {
            BillingError::Config(format!("no Lemon Squeezy variant configured for {plan:?}"))
        })?;

        let checkout = self
            .lemon
            .create_checkout(CreateLemonCheckout {
                variant_id,
                user_id: Some(user_id.to_string()),
                ..Default::default()
            })
            .await?;

        tracing::info!(user_id = %user_id, plan = ?plan, "created Lemon Squeezy checkout");
        Ok(CheckoutLink {
            url: checkout.checkout_url,
        })
    }
}

/// Stripe price id for a plan.
fn stripe_price(config: &StripeConfig, plan: PlanType) -> BillingResult<&str> {
    match plan {
        PlanType::Monthly => Ok(config.price_ids.monthly.as_str()),
        PlanType::Yearly => Ok(config.price_ids.yearly.as_str()),
        PlanType::Credits => config
            .price_ids
            .credits10
            .as_deref()
            .ok_or_else(|| BillingError::Config("no credits price configured".to_string())),
    }
}

/// Lemon Squeezy variant id for a plan, when one is configured.
fn lemon_variant(config: &LemonConfig, plan: PlanType) -> Option<String> {
    match plan {
        PlanType::Monthly => config.variant_id_monthly.clone(),
        PlanType::Yearly => config.variant_id_yearly.clone(),
        PlanType::Credits => config.variant_id_credits10.clone(),
    }
}

/// Metadata stamped onto a credits payment intent so the webhook can credit
/// the purchase.
fn credits_intent_metadata(user_id: &str) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("type".to_string(), "credits".to_string());
    metadata.insert("userId".to_string(), user_id.to_string());
    metadata.insert("amount".to_string(), "10".to_string());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{PriceIds, StripeClient};

    fn stripe_config(credits10: Option<&str>) -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_1".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_ids: PriceIds {
                monthly: "price_m".to_string(),
                yearly: "price_y".to_string(),
                credits10: credits10.map(str::to_string),
            },
            app_url: "http://localhost:3000".to_string(),
        }
    }

    fn lemon_config(monthly: Option<&str>) -> LemonConfig {
        LemonConfig {
            api_key: "ls_test".to_string(),
            store_id: "1".to_string(),
            webhook_secret: "secret".to_string(),
            variant_id_monthly: monthly.map(str::to_string),
            variant_id_yearly: None,
            variant_id_credits10: None,
            credit_variants: HashMap::new(),
            api_url: "http://127.0.0.1:1".to_string(),
        }
    }

    #[test]
    fn plans_map_to_their_stripe_prices() {
        let config = stripe_config(Some("price_c"));
        assert_eq!(stripe_price(&config, PlanType::Monthly).unwrap(), "price_m");
        assert_eq!(stripe_price(&config, PlanType::Yearly).unwrap(), "price_y");
        assert_eq!(stripe_price(&config, PlanType::Credits).unwrap(), "price_c");
    }

    #[test]
    fn credits_plan_without_a_price_is_a_config_error() {
        let config = stripe_config(None);
        assert!(matches!(
            stripe_price(&config, PlanType::Credits),
            Err(BillingError::Config(_))
        ));
    }

    #[test]
    fn plans_map_to_their_lemon_variants() {
        let config = lemon_config(Some("111"));
        assert_eq!(
            lemon_variant(&config, PlanType::Monthly).as_deref(),
            Some("111")
        );
        assert_eq!(lemon_variant(&config, PlanType::Yearly), None);
        assert_eq!(lemon_variant(&config, PlanType::Credits), None);
    }

    #[test]
    fn credits_metadata_carries_everything_the_webhook_needs() {
        let metadata = credits_intent_metadata("user_1");
        assert_eq!(metadata.get("type").map(String::as_str), Some("credits"));
        assert_eq!(metadata.get("userId").map(String::as_str), Some("user_1"));
        assert_eq!(metadata.get("amount").map(String::as_str), Some("10"));
    }

    #[tokio::test]
    async fn unconfigured_lemon_plan_fails_before_any_api_call() {
        let service = CheckoutService::new(
            StripeClient::new(stripe_config(None)),
            LemonClient::new(lemon_config(None)),
        );
        let result = service
            .create(craftpass_shared::PaymentProvider::LemonSqueezy, PlanType::Monthly, "user_1")
            .await;
        assert!(matches!(result, Err(BillingError::Config(_))));
    }
}
