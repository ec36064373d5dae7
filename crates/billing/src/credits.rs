//! Credit ledger
//!
//! At-most-once crediting keyed by external order id. An order key is
//! claimed in the processed-orders set before the balance moves; a key that
//! is already claimed means the order was credited (or is being credited)
//! and the apply becomes a no-op error the caller treats as success.

use std::sync::Arc;

use craftpass_shared::{MembershipProfile, PaymentProvider};

use crate::error::LedgerError;
use crate::profiles::ProfileStore;

pub struct CreditLedger {
    store: Arc<dyn ProfileStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Credit a user's balance for one external order.
    ///
    /// Replays of the same order are rejected with
    /// [`LedgerError::DuplicateOrder`] without touching the balance.
    pub async fn apply(
        &self,
        provider: PaymentProvider,
        order_id: &str,
        user_id: &str,
        amount: i64,
    ) -> Result<MembershipProfile, LedgerError> {
        let credits: i32 = amount
            .try_into()
            .ok()
            .filter(|c| *c > 0)
            .ok_or(LedgerError::InvalidAmount(amount))?;

        let order_key = order_key(provider, order_id);
        let claimed = self
            .store
            .claim_order(&order_key, user_id, credits)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        if !claimed {
            return Err(LedgerError::DuplicateOrder(order_key));
        }

        match self.store.add_credits(user_id, credits).await {
            Ok(Some(profile)) => {
                tracing::info!(
                    user_id = %user_id,
                    order_key = %order_key,
                    credits,
                    balance = profile.credits,
                    "credited order"
                );
                Ok(profile)
            }
            Ok(None) => {
                // The claim stays released so a retry after the profile
                // exists can still credit this order.
                self.release_claim(&order_key).await;
                Err(LedgerError::UnknownUser(user_id.to_string()))
            }
            Err(e) => {
                self.release_claim(&order_key).await;
                Err(LedgerError::Database(e.to_string()))
            }
        }
    }

    async fn release_claim(&self, order_key: &str) {
        if let Err(e) = self.store.release_order(order_key).await {
            tracing::error!(order_key = %order_key, error = %e, "failed to release order claim");
        }
    }
}

/// Dedup key for a processed order, unique across providers.
fn order_key(provider: PaymentProvider, order_id: &str) -> String {
    format!("{provider}:{order_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::MemoryProfileStore;

    async fn ledger_with_user() -> (CreditLedger, Arc<MemoryProfileStore>) {
        let store = Arc::new(MemoryProfileStore::default());
        store
            .upsert(&MembershipProfile::new("user_1"))
            .await
            .unwrap();
        (CreditLedger::new(store.clone()), store)
    }

    #[tokio::test]
    async fn credits_are_added_once() {
        let (ledger, store) = ledger_with_user().await;
        let profile = ledger
            .apply(PaymentProvider::LemonSqueezy, "ord_1", "user_1", 10)
            .await
            .unwrap();
        assert_eq!(profile.credits, 10);

        let replay = ledger
            .apply(PaymentProvider::LemonSqueezy, "ord_1", "user_1", 10)
            .await;
        assert!(matches!(replay, Err(LedgerError::DuplicateOrder(_))));

        let stored = store.find_by_user_id("user_1").await.unwrap().unwrap();
        assert_eq!(stored.credits, 10);
    }

    #[tokio::test]
    async fn same_order_id_on_different_providers_is_distinct() {
        let (ledger, store) = ledger_with_user().await;
        ledger
            .apply(PaymentProvider::LemonSqueezy, "ord_1", "user_1", 10)
            .await
            .unwrap();
        ledger
            .apply(PaymentProvider::Stripe, "ord_1", "user_1", 5)
            .await
            .unwrap();
        let stored = store.find_by_user_id("user_1").await.unwrap().unwrap();
        assert_eq!(stored.credits, 15);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let (ledger, _) = ledger_with_user().await;
        for amount in [0, -5, i64::from(i32::MAX) + 1] {
            let result = ledger
                .apply(PaymentProvider::Stripe, "ord_bad", "user_1", amount)
                .await;
            assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
        }
    }

    #[tokio::test]
    async fn unknown_user_releases_the_claim() {
        let (ledger, store) = ledger_with_user().await;
        let result = ledger
            .apply(PaymentProvider::Stripe, "ord_2", "ghost", 10)
            .await;
        assert!(matches!(result, Err(LedgerError::UnknownUser(_))));

        // After the user exists, the same order can still be credited.
        store
            .upsert(&MembershipProfile::new("ghost"))
            .await
            .unwrap();
        let profile = ledger
            .apply(PaymentProvider::Stripe, "ord_2", "ghost", 10)
            .await
            .unwrap();
        assert_eq!(profile.credits, 10);
    }
}
