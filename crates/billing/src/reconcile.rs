//! Membership reconciliation
//!
//! Applies canonical subscription events to the profile store. The engine is
//! idempotent: every apply derives the target state from the event alone and
//! writes it with a single conditional update, so replays and out-of-order
//! duplicates converge on the same row.

use std::sync::Arc;

use craftpass_shared::{MembershipProfile, MembershipTier, PaymentProvider};

use crate::error::{LinkError, ReconcileError};
use crate::events::{CanonicalSubscriptionEvent, SubscriptionEventKind};
use crate::profiles::ProfileStore;
use crate::resolver::{self, tier_from_classifier};

pub struct ReconcileEngine {
    store: Arc<dyn ProfileStore>,
}

impl ReconcileEngine {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Apply a subscription event to the profile it belongs to.
    ///
    /// The profile is located by provider customer id only. An event for a
    /// customer id no profile carries is a hard error and never creates a
    /// profile: the linking flow is the only path that associates customers
    /// with users.
    pub async fn apply(
        &self,
        event: &CanonicalSubscriptionEvent,
    ) -> Result<MembershipProfile, ReconcileError> {
        let requested = tier_from_classifier(&event.product_classifier);

        // A lapsed subscription grants nothing regardless of what the
        // product would otherwise entitle.
        let tier = if event.kind == SubscriptionEventKind::Expired {
            MembershipTier::Free
        } else {
            resolver::resolve(&event.raw_status, requested)
        };

        let updated = self
            .store
            .apply_subscription_state(
                event.provider,
                &event.provider_customer_id,
                &event.subscription_id,
                tier,
            )
            .await
            .map_err(|e| ReconcileError::Database(e.to_string()))?;

        match updated {
            Some(profile) => {
                tracing::info!(
                    provider = %event.provider,
                    customer_id = %event.provider_customer_id,
                    membership = %profile.membership,
                    status = %event.raw_status,
                    "reconciled membership"
                );
                Ok(profile)
            }
            None => Err(ReconcileError::UnknownCustomer {
                provider: event.provider,
                customer_id: event.provider_customer_id.clone(),
            }),
        }
    }

    /// Link a provider customer to a user profile.
    ///
    /// Runs on checkout completion, when the provider first tells us which
    /// customer id it minted for the user we sent to checkout.
    pub async fn link_customer(
        &self,
        user_id: &str,
        provider: PaymentProvider,
        provider_customer_id: &str,
        subscription_id: Option<&str>,
        portal_url: Option<&str>,
    ) -> Result<MembershipProfile, LinkError> {
        let linked = self
            .store
            .link_provider_customer(
                user_id,
                provider,
                provider_customer_id,
                subscription_id,
                portal_url,
            )
            .await
            .map_err(|e| LinkError::Database(e.to_string()))?;

        match linked {
            Some(profile) => {
                tracing::info!(
                    user_id = %user_id,
                    provider = %provider,
                    customer_id = %provider_customer_id,
                    "linked provider customer to profile"
                );
                Ok(profile)
            }
            None => Err(LinkError::ProfileNotFound(user_id.to_string())),
        }
    }
}
