//! Provider adapters
//!
//! Translate each provider's native event shape into the canonical types in
//! [`crate::events`]. Both adapters implement the same contract: a verified
//! payload goes in, a [`WebhookAction`] comes out, and anything outside the
//! per-provider allow-list is `Ignored` with no side effects. Adapters never
//! touch the profile store.

use std::collections::HashMap;

use craftpass_shared::PaymentProvider;
use serde_json::Value;
use stripe::{Event, EventObject, EventType, Expandable, Subscription, SubscriptionStatus};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult, ClassifyError};
use crate::events::{CanonicalSubscriptionEvent, SubscriptionEventKind, WebhookAction};
use crate::lemon::LemonConfig;

/// Markers in a variant name that identify a credits purchase.
const CREDIT_MARKERS: [&str; 2] = ["credit", "token"];

/// Product metadata key carrying the structured membership tier.
const MEMBERSHIP_METADATA_KEY: &str = "membership";

// ---------------------------------------------------------------------------
// Lemon Squeezy
// ---------------------------------------------------------------------------

/// Adapter for Lemon Squeezy webhook payloads. Pure: everything it needs is
/// inline in the order/subscription resource.
#[derive(Debug, Clone, Default)]
pub struct LemonAdapter {
    /// Known credit-pack variants (variant id -> credit amount), used when
    /// the variant name carries no leading number.
    credit_variants: HashMap<String, i64>,
}

impl LemonAdapter {
    pub fn new(credit_variants: HashMap<String, i64>) -> Self {
        Self { credit_variants }
    }

    pub fn from_config(config: &LemonConfig) -> Self {
        Self::new(config.credit_variants.clone())
    }

    /// Classify a verified Lemon Squeezy webhook payload.
    pub fn classify(&self, payload: &Value) -> Result<WebhookAction, ClassifyError> {
        let event_name = payload["meta"]["event_name"].as_str().unwrap_or_default();

        let kind = match event_name {
            "subscription_created" => SubscriptionEventKind::Created,
            "subscription_updated" => SubscriptionEventKind::Updated,
            "subscription_cancelled" => SubscriptionEventKind::Cancelled,
            "subscription_expired" => SubscriptionEventKind::Expired,
            "subscription_paused" => SubscriptionEventKind::Paused,
            "subscription_resumed" | "subscription_unpaused" => SubscriptionEventKind::Resumed,
            "order_created" => return self.classify_order(payload),
            // Credit clawback for refunds is out of scope; acknowledge only.
            "order_refunded" => return Ok(WebhookAction::Ignored),
            _ => return Ok(WebhookAction::Ignored),
        };

        let data = &payload["data"];
        let subscription_id = require_str(data, "/id", event_name)?;
        let customer_id = require_id(data, "/attributes/customer_id", event_name)?;
        let variant_name = require_str(data, "/attributes/variant_name", event_name)?;
        let raw_status = require_str(data, "/attributes/status", event_name)?;

        Ok(WebhookAction::Subscription(CanonicalSubscriptionEvent {
            provider: PaymentProvider::LemonSqueezy,
            kind,
            subscription_id,
            provider_customer_id: customer_id,
            product_classifier: variant_name,
            raw_status,
        }))
    }

    fn classify_order(&self, payload: &Value) -> Result<WebhookAction, ClassifyError> {
        let data = &payload["data"];
        let order_id = require_str(data, "/id", "order_created")?;
        let customer_id = require_id(data, "/attributes/customer_id", "order_created")?;

        // The user id arrives in the checkout's custom data; older checkouts
        // used a bare user_id attribute.
        let attributes = &data["attributes"];
        let user_id = attributes["custom_data"]["userId"]
            .as_str()
            .map(str::to_string)
            .or_else(|| id_string(&attributes["user_id"]));

        let item = &attributes["first_order_item"];
        if item.is_null() {
            return Err(ClassifyError::Payload {
                event: "order_created".to_string(),
                detail: "missing first_order_item".to_string(),
            });
        }

        // A subscription id on the line item means this order started a
        // subscription: it is the linking leg, not a credits purchase.
        if let Some(subscription_id) = id_string(&item["subscription_id"]) {
            return Ok(WebhookAction::CheckoutCompleted {
                provider: PaymentProvider::LemonSqueezy,
                user_id,
                subscription_id,
                provider_customer_id: customer_id,
            });
        }

        let variant_name = item["variant_name"].as_str().unwrap_or_default();
        let lowered = variant_name.to_ascii_lowercase();
        if !CREDIT_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Ok(WebhookAction::Ignored);
        }

        let amount = credit_amount_from_name(variant_name).or_else(|| {
            id_string(&item["variant_id"])
                .and_then(|variant_id| self.credit_variants.get(&variant_id).copied())
        });

        match amount {
            Some(amount) if amount > 0 => Ok(WebhookAction::Credits {
                provider: PaymentProvider::LemonSqueezy,
                user_id,
                amount,
                order_id,
            }),
            _ => Ok(WebhookAction::Ignored),
        }
    }
}

/// Parse the pack size out of a credit variant name: the integer sitting
/// immediately before the credit word, e.g. "10 Credits" -> 10.
/// "10% Bonus Credits" has no such number and falls back to the variant
/// table.
fn credit_amount_from_name(variant_name: &str) -> Option<i64> {
    let lowered = variant_name.to_ascii_lowercase();
    CREDIT_MARKERS.iter().find_map(|marker| {
        let prefix = lowered[..lowered.find(marker)?].trim_end();
        let digits: String = prefix
            .chars()
            .rev()
            .take_while(char::is_ascii_digit)
            .collect();
        if digits.is_empty() {
            return None;
        }
        digits.chars().rev().collect::<String>().parse().ok()
    })
}

fn require_str(data: &Value, pointer: &str, event: &str) -> Result<String, ClassifyError> {
    data.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClassifyError::Payload {
            event: event.to_string(),
            detail: format!("missing {pointer}"),
        })
}

fn require_id(data: &Value, pointer: &str, event: &str) -> Result<String, ClassifyError> {
    data.pointer(pointer)
        .and_then(id_string)
        .ok_or_else(|| ClassifyError::Payload {
            event: event.to_string(),
            detail: format!("missing {pointer}"),
        })
}

/// Lemon Squeezy ids arrive as numbers or strings depending on the field.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Stripe
// ---------------------------------------------------------------------------

/// Adapter for verified Stripe events. Classification is async because the
/// membership tier lives in product metadata, which the event does not
/// embed.
#[derive(Clone)]
pub struct StripeAdapter {
    client: StripeClient,
}

impl StripeAdapter {
    pub fn new(client: StripeClient) -> Self {
        Self { client }
    }

    /// Classify a verified Stripe event.
    pub async fn classify(&self, event: &Event) -> BillingResult<WebhookAction> {
        match event.type_ {
            EventType::CustomerSubscriptionCreated => {
                self.subscription_action(event, SubscriptionEventKind::Created)
                    .await
            }
            EventType::CustomerSubscriptionUpdated => {
                self.subscription_action(event, SubscriptionEventKind::Updated)
                    .await
            }
            // Stripe reports a deleted subscription with status "canceled";
            // for membership purposes deletion is the lapse event.
            EventType::CustomerSubscriptionDeleted => {
                self.subscription_action(event, SubscriptionEventKind::Expired)
                    .await
            }
            EventType::CheckoutSessionCompleted => self.checkout_action(event),
            EventType::PaymentIntentSucceeded => Ok(payment_intent_action(event)),
            _ => {
                tracing::debug!(
                    event_type = %event.type_,
                    "Stripe event type outside allow-list, ignoring"
                );
                Ok(WebhookAction::Ignored)
            }
        }
    }

    async fn subscription_action(
        &self,
        event: &Event,
        kind: SubscriptionEventKind,
    ) -> BillingResult<WebhookAction> {
        let subscription = match &event.data.object {
            EventObject::Subscription(subscription) => subscription,
            _ => {
                return Err(ClassifyError::Payload {
                    event: event.type_.to_string(),
                    detail: "expected a subscription object".to_string(),
                }
                .into())
            }
        };
        Ok(WebhookAction::Subscription(
            self.canonical_from_subscription(subscription, kind).await?,
        ))
    }

    /// Build a canonical event from a Stripe subscription, resolving the
    /// product classifier through product metadata.
    pub(crate) async fn canonical_from_subscription(
        &self,
        subscription: &Subscription,
        kind: SubscriptionEventKind,
    ) -> BillingResult<CanonicalSubscriptionEvent> {
        let customer_id = expandable_id(&subscription.customer);

        let product_id = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .and_then(|price| price.product.as_ref())
            .map(expandable_id)
            .ok_or_else(|| {
                BillingError::from(ClassifyError::Payload {
                    event: "customer.subscription".to_string(),
                    detail: "subscription has no priced line item".to_string(),
                })
            })?;

        let product = self.client.get_product(&product_id).await?;
        let product_classifier = classify_product(&product)?;

        Ok(CanonicalSubscriptionEvent {
            provider: PaymentProvider::Stripe,
            kind,
            subscription_id: subscription.id.to_string(),
            provider_customer_id: customer_id,
            product_classifier,
            raw_status: stripe_status_str(subscription.status).to_string(),
        })
    }

    fn checkout_action(&self, event: &Event) -> BillingResult<WebhookAction> {
        let session = match &event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(ClassifyError::Payload {
                    event: "checkout.session.completed".to_string(),
                    detail: "expected a checkout session object".to_string(),
                }
                .into())
            }
        };

        match session.mode {
            stripe::CheckoutSessionMode::Subscription => {
                let subscription_id = session
                    .subscription
                    .as_ref()
                    .map(expandable_id)
                    .ok_or_else(|| {
                        BillingError::from(ClassifyError::Payload {
                            event: "checkout.session.completed".to_string(),
                            detail: "subscription-mode session without subscription".to_string(),
                        })
                    })?;
                let customer_id = session
                    .customer
                    .as_ref()
                    .map(expandable_id)
                    .unwrap_or_default();
                Ok(WebhookAction::CheckoutCompleted {
                    provider: PaymentProvider::Stripe,
                    user_id: session.client_reference_id.clone(),
                    subscription_id,
                    provider_customer_id: customer_id,
                })
            }
            // One-time payments are credited off payment_intent.succeeded,
            // which carries the credits metadata.
            stripe::CheckoutSessionMode::Payment => Ok(WebhookAction::Ignored),
            stripe::CheckoutSessionMode::Setup => Ok(WebhookAction::Ignored),
        }
    }
}

fn payment_intent_action(event: &Event) -> WebhookAction {
    let intent = match &event.data.object {
        EventObject::PaymentIntent(intent) => intent,
        _ => return WebhookAction::Ignored,
    };

    if intent.metadata.get("type").map(String::as_str) != Some("credits") {
        return WebhookAction::Ignored;
    }

    let user_id = intent.metadata.get("userId").cloned();
    let amount = intent
        .metadata
        .get("amount")
        .and_then(|a| a.parse::<i64>().ok());

    match amount {
        Some(amount) if amount > 0 => WebhookAction::Credits {
            provider: PaymentProvider::Stripe,
            user_id,
            amount,
            order_id: intent.id.to_string(),
        },
        _ => WebhookAction::Ignored,
    }
}

/// Classifier string for a Stripe product: validated tier metadata when
/// present, display name otherwise. Metadata outside {free, pro} is a hard
/// error, never silently coerced.
fn classify_product(product: &stripe::Product) -> Result<String, ClassifyError> {
    if let Some(value) = product
        .metadata
        .as_ref()
        .and_then(|m| m.get(MEMBERSHIP_METADATA_KEY))
    {
        let lowered = value.trim().to_ascii_lowercase();
        return match lowered.as_str() {
            "free" | "pro" => Ok(lowered),
            _ => Err(ClassifyError::InvalidTierMetadata(value.clone())),
        };
    }
    Ok(product.name.clone().unwrap_or_default())
}

fn expandable_id<T: stripe::Object>(expandable: &Expandable<T>) -> String
where
    T::Id: ToString,
{
    match expandable {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(object) => object.id().to_string(),
    }
}

fn stripe_status_str(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Canceled => "canceled",
        SubscriptionStatus::Incomplete => "incomplete",
        SubscriptionStatus::IncompleteExpired => "incomplete_expired",
        SubscriptionStatus::PastDue => "past_due",
        SubscriptionStatus::Trialing => "trialing",
        SubscriptionStatus::Unpaid => "unpaid",
        SubscriptionStatus::Paused => "paused",
    }
}
