//! Canonical webhook events
//!
//! Both provider adapters translate their native event shapes into these
//! types. They are constructed once per webhook delivery, consumed by the
//! reconciliation engine or the credit ledger, then discarded; the
//! membership profile is the only durable entity.

use craftpass_shared::PaymentProvider;

/// Lifecycle phase reported by a subscription event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEventKind {
    Created,
    Updated,
    Cancelled,
    Expired,
    Paused,
    Resumed,
}

/// A provider-agnostic subscription lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSubscriptionEvent {
    pub provider: PaymentProvider,
    pub kind: SubscriptionEventKind,
    pub subscription_id: String,
    /// The provider's customer id. Lifecycle webhooks carry only this, not
    /// our own user id; the linking flow established the mapping earlier.
    pub provider_customer_id: String,
    /// Product/variant identifier or display name used for tier
    /// classification.
    pub product_classifier: String,
    /// The provider's own status string, e.g. "active" or "past_due".
    pub raw_status: String,
}

/// What an adapter decided to do with a verified payload.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAction {
    /// Reconcile membership state from a subscription lifecycle event.
    Subscription(CanonicalSubscriptionEvent),
    /// First checkout completion: link the user to the provider customer.
    CheckoutCompleted {
        provider: PaymentProvider,
        user_id: Option<String>,
        subscription_id: String,
        provider_customer_id: String,
    },
    /// One-time credits purchase.
    Credits {
        provider: PaymentProvider,
        user_id: Option<String>,
        amount: i64,
        order_id: String,
    },
    /// Recognized but intentionally skipped, or outside the allow-list.
    /// Must trigger no side effects.
    Ignored,
}
