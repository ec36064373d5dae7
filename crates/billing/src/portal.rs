//! Customer portal access
//!
//! Stripe portal sessions are minted on demand and expire quickly; Lemon
//! Squeezy exposes a long-lived portal URL on the customer resource. Either
//! way the caller gets a URL the user can be redirected to.

use std::sync::Arc;

use craftpass_shared::{MembershipProfile, PaymentProvider};
use stripe::{BillingPortalSession, CreateBillingPortalSession, CustomerId};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult, LinkError};
use crate::lemon::LemonClient;
use crate::profiles::ProfileStore;

pub struct PortalService {
    stripe: StripeClient,
    lemon: LemonClient,
    store: Arc<dyn ProfileStore>,
}

impl PortalService {
    pub fn new(stripe: StripeClient, lemon: LemonClient, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            stripe,
            lemon,
            store,
        }
    }

    /// Portal URL for a user's active payment provider.
    pub async fn portal_url(&self, user_id: &str) -> BillingResult<String> {
        let profile = self
            .store
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| BillingError::Link(LinkError::ProfileNotFound(user_id.to_string())))?;

        let provider = profile.payment_provider.ok_or_else(|| {
            BillingError::Config("user has no payment provider on file".to_string())
        })?;

        match provider {
            PaymentProvider::Stripe => self.stripe_portal_url(&profile).await,
            PaymentProvider::LemonSqueezy => self.lemon_portal_url(&profile).await,
        }
    }

    async fn stripe_portal_url(&self, profile: &MembershipProfile) -> BillingResult<String> {
        let customer_id = profile
            .stripe_customer_id
            .as_deref()
            .ok_or_else(|| BillingError::Config("no Stripe customer on profile".to_string()))?;
        let customer_id: CustomerId = customer_id
            .parse()
            .map_err(|_| BillingError::Internal("malformed Stripe customer id".to_string()))?;

        let return_url = format!("{}/billing", self.stripe.config().app_url);
        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(&return_url);

        let session = BillingPortalSession::create(self.stripe.inner(), params).await?;
        Ok(session.url)
    }

    async fn lemon_portal_url(&self, profile: &MembershipProfile) -> BillingResult<String> {
        // Prefer the URL captured at link time; it may have gone stale, so
        // fall back to a fresh customer lookup.
        if let Some(url) = &profile.customer_portal_url {
            return Ok(url.clone());
        }

        let customer_id = profile
            .lemon_squeezy_customer_id
            .as_deref()
            .ok_or_else(|| {
                BillingError::Config("no Lemon Squeezy customer on profile".to_string())
            })?;

        self.lemon
            .get_customer_portal_url(customer_id)
            .await
            .ok_or_else(|| BillingError::LemonApi("customer portal URL unavailable".to_string()))
    }
}
