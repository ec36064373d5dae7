//! Stripe client wrapper
//!
//! Explicit configuration instead of a module-level singleton, so handlers
//! and tests construct their own clients.

use std::sync::Arc;

use stripe::{Product, ProductId, Subscription, SubscriptionId};

use crate::error::{BillingError, BillingResult};

/// Stripe price ids for the plans we sell.
#[derive(Debug, Clone)]
pub struct PriceIds {
    pub monthly: String,
    pub yearly: String,
    /// One-time 10-credit pack; optional because self-hosted deployments
    /// may not sell credits through Stripe.
    pub credits10: Option<String>,
}

/// Stripe configuration.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_ids: PriceIds,
    /// Base URL for checkout redirect targets.
    pub app_url: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let require = |key: &str| {
            std::env::var(key).map_err(|_| BillingError::Config(format!("{key} is not set")))
        };
        Ok(Self {
            secret_key: require("STRIPE_SECRET_KEY")?,
            webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            price_ids: PriceIds {
                monthly: require("STRIPE_PRICE_ID_MONTHLY")?,
                yearly: require("STRIPE_PRICE_ID_YEARLY")?,
                credits10: std::env::var("STRIPE_PRICE_ID_CREDITS_10").ok(),
            },
            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }
}

/// Shared Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Retrieve a subscription by its id.
    pub async fn get_subscription(&self, subscription_id: &str) -> BillingResult<Subscription> {
        let id: SubscriptionId = subscription_id
            .parse()
            .map_err(|_| BillingError::Internal(format!("invalid subscription id {subscription_id}")))?;
        Ok(Subscription::retrieve(&self.client, &id, &[]).await?)
    }

    /// Retrieve a product by its id (for tier metadata lookup).
    pub async fn get_product(&self, product_id: &str) -> BillingResult<Product> {
        let id: ProductId = product_id
            .parse()
            .map_err(|_| BillingError::Internal(format!("invalid product id {product_id}")))?;
        Ok(Product::retrieve(&self.client, &id, &[]).await?)
    }
}
