//! Core membership domain types

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Membership tier of a user profile.
///
/// `Pro` is only held while the profile's last-known subscription status
/// resolved to an active-equivalent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "membership", rename_all = "lowercase")]
pub enum MembershipTier {
    #[default]
    Free,
    Pro,
}

impl MembershipTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Free => "free",
            MembershipTier::Pro => "pro",
        }
    }
}

impl std::fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which payment provider a profile is billed through.
///
/// A profile that never checked out has no provider (stored as SQL NULL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "payment_provider", rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    #[serde(rename = "lemonsqueezy")]
    #[sqlx(rename = "lemonsqueezy")]
    LemonSqueezy,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::LemonSqueezy => "lemonsqueezy",
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's membership profile.
///
/// Owned by the profile store and mutated exclusively through the
/// reconciliation engine, the linking flow, and the credit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MembershipProfile {
    pub user_id: String,
    pub membership: MembershipTier,
    pub payment_provider: Option<PaymentProvider>,
    /// Credit balance, monotonically non-decreasing (refund clawback is out
    /// of scope).
    pub credits: i32,
    pub last_credit_purchase: Option<OffsetDateTime>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub lemon_squeezy_customer_id: Option<String>,
    pub lemon_squeezy_subscription_id: Option<String>,
    pub customer_portal_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl MembershipProfile {
    /// A fresh free-tier profile with no provider linkage.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            user_id: user_id.into(),
            membership: MembershipTier::Free,
            payment_provider: None,
            credits: 0,
            last_credit_purchase: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            lemon_squeezy_customer_id: None,
            lemon_squeezy_subscription_id: None,
            customer_portal_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The provider customer id for the profile's active provider, if any.
    pub fn provider_customer_id(&self) -> Option<&str> {
        match self.payment_provider? {
            PaymentProvider::Stripe => self.stripe_customer_id.as_deref(),
            PaymentProvider::LemonSqueezy => self.lemon_squeezy_customer_id.as_deref(),
        }
    }
}
