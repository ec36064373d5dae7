//! Lemon Squeezy API client
//!
//! Lemon Squeezy has no Rust SDK, so this is a thin JSON:API client over
//! reqwest covering the calls the reconciliation core needs: checkout
//! creation, subscription/customer retrieval, and the customer portal URL.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use crate::error::{BillingError, BillingResult};

const JSON_API: &str = "application/vnd.api+json";
const DEFAULT_API_URL: &str = "https://api.lemonsqueezy.com/v1";

/// Lemon Squeezy configuration.
#[derive(Debug, Clone)]
pub struct LemonConfig {
    pub api_key: String,
    pub store_id: String,
    pub webhook_secret: String,
    pub variant_id_monthly: Option<String>,
    pub variant_id_yearly: Option<String>,
    pub variant_id_credits10: Option<String>,
    /// Known credit-pack variants: variant id -> credit amount. Used when a
    /// variant name carries no numeric amount.
    pub credit_variants: HashMap<String, i64>,
    /// Base API URL, overridable for tests.
    pub api_url: String,
}

impl LemonConfig {
    pub fn from_env() -> BillingResult<Self> {
        let require = |key: &str| {
            std::env::var(key).map_err(|_| BillingError::Config(format!("{key} is not set")))
        };
        let optional = |key: &str| std::env::var(key).ok();
        let variant_id_credits10 = optional("LEMONSQUEEZY_VARIANT_ID_CREDITS_10");
        let mut credit_variants = HashMap::new();
        if let Some(variant_id) = &variant_id_credits10 {
            credit_variants.insert(variant_id.clone(), 10);
        }
        Ok(Self {
            api_key: require("LEMONSQUEEZY_API_KEY")?,
            store_id: require("LEMONSQUEEZY_STORE_ID")?,
            webhook_secret: require("LEMONSQUEEZY_WEBHOOK_SECRET")?,
            variant_id_monthly: optional("LEMONSQUEEZY_VARIANT_ID_MONTHLY"),
            variant_id_yearly: optional("LEMONSQUEEZY_VARIANT_ID_YEARLY"),
            variant_id_credits10,
            credit_variants,
            api_url: std::env::var("LEMONSQUEEZY_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        })
    }
}

/// Subscription resource as returned by `GET /subscriptions/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct LemonSubscription {
    pub data: LemonSubscriptionData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LemonSubscriptionData {
    pub id: String,
    pub attributes: LemonSubscriptionAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LemonSubscriptionAttributes {
    pub customer_id: i64,
    pub product_name: String,
    pub variant_name: String,
    /// active, cancelled, expired, paused, past_due, unpaid
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutResource {
    data: CheckoutResourceData,
}

#[derive(Debug, Deserialize)]
struct CheckoutResourceData {
    id: String,
    attributes: CheckoutResourceAttributes,
}

#[derive(Debug, Deserialize)]
struct CheckoutResourceAttributes {
    url: String,
}

/// A created checkout session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LemonCheckout {
    pub checkout_url: String,
    pub checkout_id: String,
}

/// Options for creating a checkout.
#[derive(Debug, Clone, Default)]
pub struct CreateLemonCheckout {
    pub variant_id: String,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// Lemon Squeezy API client.
#[derive(Clone)]
pub struct LemonClient {
    http: reqwest::Client,
    config: Arc<LemonConfig>,
}

impl LemonClient {
    pub fn new(config: LemonConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(LemonConfig::from_env()?))
    }

    pub fn config(&self) -> &LemonConfig {
        &self.config
    }

    async fn get_json(&self, endpoint: &str) -> BillingResult<serde_json::Value> {
        let url = format!("{}{endpoint}", self.config.api_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, JSON_API)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BillingError::LemonApi(format!(
                "{} {} for {endpoint}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("error"),
            )));
        }

        Ok(response.json().await?)
    }

    /// Create a checkout for a variant.
    pub async fn create_checkout(
        &self,
        options: CreateLemonCheckout,
    ) -> BillingResult<LemonCheckout> {
        let mut checkout_data = json!({});
        if let Some(email) = &options.email {
            checkout_data["email"] = json!(email);
        }
        if let Some(user_id) = &options.user_id {
            checkout_data["custom"] = json!({ "userId": user_id });
        }
        if let Some(url) = &options.success_url {
            checkout_data["success_url"] = json!(url);
        }
        if let Some(url) = &options.cancel_url {
            checkout_data["cancel_url"] = json!(url);
        }

        let body = json!({
            "data": {
                "type": "checkouts",
                "attributes": {
                    "store_id": self.config.store_id,
                    "variant_id": options.variant_id,
                    "checkout_data": checkout_data,
                }
            }
        });

        let url = format!("{}/checkouts", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, JSON_API)
            .header(CONTENT_TYPE, JSON_API)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BillingError::LemonApi(format!(
                "checkout creation failed with status {}",
                response.status().as_u16()
            )));
        }

        let resource: CheckoutResource = response.json().await?;
        Ok(LemonCheckout {
            checkout_url: resource.data.attributes.url,
            checkout_id: resource.data.id,
        })
    }

    /// Retrieve a subscription.
    pub async fn get_subscription(&self, subscription_id: &str) -> BillingResult<LemonSubscription> {
        let value = self
            .get_json(&format!("/subscriptions/{subscription_id}"))
            .await?;
        serde_json::from_value(value).map_err(|e| BillingError::LemonApi(e.to_string()))
    }

    /// Retrieve a customer.
    pub async fn get_customer(&self, customer_id: &str) -> BillingResult<serde_json::Value> {
        self.get_json(&format!("/customers/{customer_id}")).await
    }

    /// Customer portal URL, or `None` when the lookup fails. Portal lookup
    /// is best-effort; linking proceeds without it.
    pub async fn get_customer_portal_url(&self, customer_id: &str) -> Option<String> {
        match self.get_customer(customer_id).await {
            Ok(customer) => customer["data"]["attributes"]["urls"]["customer_portal"]
                .as_str()
                .map(str::to_string),
            Err(e) => {
                tracing::warn!(
                    customer_id = %customer_id,
                    error = %e,
                    "Could not fetch customer portal URL"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(api_url: String) -> LemonConfig {
        LemonConfig {
            api_key: "ls_test_key".to_string(),
            store_id: "12345".to_string(),
            webhook_secret: "whsec".to_string(),
            variant_id_monthly: None,
            variant_id_yearly: None,
            variant_id_credits10: None,
            credit_variants: HashMap::new(),
            api_url,
        }
    }

    #[tokio::test]
    async fn portal_url_extracted_from_customer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/customers/42")
            .with_status(200)
            .with_header("content-type", "application/vnd.api+json")
            .with_body(
                r#"{"data":{"id":"42","type":"customers","attributes":{
                    "name":"Test","email":"t@example.com",
                    "urls":{"customer_portal":"https://store.lemonsqueezy.com/billing?x=1"}
                }}}"#,
            )
            .create_async()
            .await;

        let client = LemonClient::new(test_config(server.url()));
        let url = client.get_customer_portal_url("42").await;
        mock.assert_async().await;
        assert_eq!(
            url.as_deref(),
            Some("https://store.lemonsqueezy.com/billing?x=1")
        );
    }

    #[tokio::test]
    async fn portal_url_lookup_failure_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/customers/42")
            .with_status(500)
            .create_async()
            .await;

        let client = LemonClient::new(test_config(server.url()));
        assert!(client.get_customer_portal_url("42").await.is_none());
    }

    #[tokio::test]
    async fn subscription_parses_status_and_names() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/subscriptions/777")
            .with_status(200)
            .with_body(
                r#"{"data":{"id":"777","type":"subscriptions","attributes":{
                    "customer_id":42,
                    "product_name":"Craftpass Pro",
                    "variant_name":"Pro Monthly",
                    "status":"active"
                }}}"#,
            )
            .create_async()
            .await;

        let client = LemonClient::new(test_config(server.url()));
        let sub = client.get_subscription("777").await.unwrap();
        assert_eq!(sub.data.id, "777");
        assert_eq!(sub.data.attributes.status, "active");
        assert_eq!(sub.data.attributes.variant_name, "Pro Monthly");
        assert_eq!(sub.data.attributes.customer_id, 42);
    }

    #[tokio::test]
    async fn checkout_creation_returns_url_and_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/checkouts")
            .with_status(201)
            .with_body(
                r#"{"data":{"id":"chk_1","type":"checkouts","attributes":{
                    "url":"https://store.lemonsqueezy.com/checkout/buy/abc"
                }}}"#,
            )
            .create_async()
            .await;

        let client = LemonClient::new(test_config(server.url()));
        let checkout = client
            .create_checkout(CreateLemonCheckout {
                variant_id: "999".to_string(),
                email: Some("t@example.com".to_string()),
                user_id: Some("user_1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(checkout.checkout_id, "chk_1");
        assert!(checkout.checkout_url.contains("checkout/buy"));
    }
}
