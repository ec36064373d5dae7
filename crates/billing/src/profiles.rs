//! Profile store
//!
//! The repository seam for membership profiles and the processed-order
//! dedup set. Every mutating operation is a single atomic statement (a
//! conditional UPDATE or an INSERT .. ON CONFLICT) so that two webhook
//! deliveries for the same customer cannot lose updates, and deliveries for
//! different customers never contend.

use async_trait::async_trait;
use craftpass_shared::{MembershipProfile, MembershipTier, PaymentProvider};
use sqlx::PgPool;

use crate::error::BillingResult;

/// Storage operations the reconciliation core needs.
///
/// Webhook handlers never create profiles; only `upsert` (invoked from the
/// account-provisioning side) can insert a row.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> BillingResult<Option<MembershipProfile>>;

    async fn find_by_provider_customer_id(
        &self,
        provider: PaymentProvider,
        customer_id: &str,
    ) -> BillingResult<Option<MembershipProfile>>;

    async fn upsert(&self, profile: &MembershipProfile) -> BillingResult<()>;

    /// Write the provider-reported subscription state onto the profile
    /// holding `customer_id`. Last write wins; returns `None` when no
    /// profile is linked to that customer.
    async fn apply_subscription_state(
        &self,
        provider: PaymentProvider,
        customer_id: &str,
        subscription_id: &str,
        tier: MembershipTier,
    ) -> BillingResult<Option<MembershipProfile>>;

    /// Write the provider linkage onto the profile keyed by `user_id`.
    /// Fields passed as `None` keep their stored value. Returns `None` when
    /// the user has no profile.
    async fn link_provider_customer(
        &self,
        user_id: &str,
        provider: PaymentProvider,
        customer_id: &str,
        subscription_id: Option<&str>,
        portal_url: Option<&str>,
    ) -> BillingResult<Option<MembershipProfile>>;

    /// Atomically claim an external order key for crediting. Returns `false`
    /// when the key was already claimed by an earlier delivery.
    async fn claim_order(&self, order_key: &str, user_id: &str, credits: i32)
        -> BillingResult<bool>;

    /// Release a claimed order key (used when crediting fails after the
    /// claim, so a later retry can succeed).
    async fn release_order(&self, order_key: &str) -> BillingResult<()>;

    /// Increment the credit balance and stamp the purchase time. Returns
    /// `None` when the user has no profile.
    async fn add_credits(
        &self,
        user_id: &str,
        amount: i32,
    ) -> BillingResult<Option<MembershipProfile>>;
}

const PROFILE_COLUMNS: &str = "user_id, membership, payment_provider, credits, \
     last_credit_purchase, stripe_customer_id, stripe_subscription_id, \
     lemon_squeezy_customer_id, lemon_squeezy_subscription_id, \
     customer_portal_url, created_at, updated_at";

/// Postgres-backed profile store.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn customer_column(provider: PaymentProvider) -> &'static str {
        match provider {
            PaymentProvider::Stripe => "stripe_customer_id",
            PaymentProvider::LemonSqueezy => "lemon_squeezy_customer_id",
        }
    }

    fn subscription_column(provider: PaymentProvider) -> &'static str {
        match provider {
            PaymentProvider::Stripe => "stripe_subscription_id",
            PaymentProvider::LemonSqueezy => "lemon_squeezy_subscription_id",
        }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_by_user_id(&self, user_id: &str) -> BillingResult<Option<MembershipProfile>> {
        let profile = sqlx::query_as::<_, MembershipProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn find_by_provider_customer_id(
        &self,
        provider: PaymentProvider,
        customer_id: &str,
    ) -> BillingResult<Option<MembershipProfile>> {
        let column = Self::customer_column(provider);
        let profile = sqlx::query_as::<_, MembershipProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE {column} = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn upsert(&self, profile: &MembershipProfile) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (
                user_id, membership, payment_provider, credits,
                last_credit_purchase, stripe_customer_id, stripe_subscription_id,
                lemon_squeezy_customer_id, lemon_squeezy_subscription_id,
                customer_portal_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id) DO UPDATE SET
                membership = EXCLUDED.membership,
                payment_provider = EXCLUDED.payment_provider,
                credits = EXCLUDED.credits,
                last_credit_purchase = EXCLUDED.last_credit_purchase,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                lemon_squeezy_customer_id = EXCLUDED.lemon_squeezy_customer_id,
                lemon_squeezy_subscription_id = EXCLUDED.lemon_squeezy_subscription_id,
                customer_portal_url = EXCLUDED.customer_portal_url,
                updated_at = NOW()
            "#,
        )
        .bind(&profile.user_id)
        .bind(profile.membership)
        .bind(profile.payment_provider)
        .bind(profile.credits)
        .bind(profile.last_credit_purchase)
        .bind(&profile.stripe_customer_id)
        .bind(&profile.stripe_subscription_id)
        .bind(&profile.lemon_squeezy_customer_id)
        .bind(&profile.lemon_squeezy_subscription_id)
        .bind(&profile.customer_portal_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_subscription_state(
        &self,
        provider: PaymentProvider,
        customer_id: &str,
        subscription_id: &str,
        tier: MembershipTier,
    ) -> BillingResult<Option<MembershipProfile>> {
        let customer_col = Self::customer_column(provider);
        let subscription_col = Self::subscription_column(provider);
        let profile = sqlx::query_as::<_, MembershipProfile>(&format!(
            r#"
            UPDATE profiles
            SET membership = $1,
                {subscription_col} = $2,
                payment_provider = $3,
                updated_at = NOW()
            WHERE {customer_col} = $4
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(tier)
        .bind(subscription_id)
        .bind(provider)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn link_provider_customer(
        &self,
        user_id: &str,
        provider: PaymentProvider,
        customer_id: &str,
        subscription_id: Option<&str>,
        portal_url: Option<&str>,
    ) -> BillingResult<Option<MembershipProfile>> {
        let customer_col = Self::customer_column(provider);
        let subscription_col = Self::subscription_column(provider);
        let profile = sqlx::query_as::<_, MembershipProfile>(&format!(
            r#"
            UPDATE profiles
            SET {customer_col} = $1,
                {subscription_col} = COALESCE($2, {subscription_col}),
                payment_provider = $3,
                customer_portal_url = COALESCE($4, customer_portal_url),
                updated_at = NOW()
            WHERE user_id = $5
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(customer_id)
        .bind(subscription_id)
        .bind(provider)
        .bind(portal_url)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn claim_order(
        &self,
        order_key: &str,
        user_id: &str,
        credits: i32,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_orders (order_key, user_id, credits)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_key) DO NOTHING
            "#,
        )
        .bind(order_key)
        .bind(user_id)
        .bind(credits)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_order(&self, order_key: &str) -> BillingResult<()> {
        sqlx::query("DELETE FROM processed_orders WHERE order_key = $1")
            .bind(order_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_credits(
        &self,
        user_id: &str,
        amount: i32,
    ) -> BillingResult<Option<MembershipProfile>> {
        let profile = sqlx::query_as::<_, MembershipProfile>(&format!(
            r#"
            UPDATE profiles
            SET credits = credits + $1,
                last_credit_purchase = NOW(),
                updated_at = NOW()
            WHERE user_id = $2
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }
}

/// In-memory profile store used as a test double and for local development
/// without Postgres.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    inner: std::sync::Arc<std::sync::Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    profiles: std::collections::HashMap<String, MembershipProfile>,
    processed_orders: std::collections::HashSet<String>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of stored profiles. Lets tests assert that webhooks never
    /// create records.
    pub fn profile_count(&self) -> usize {
        self.lock().profiles.len()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_by_user_id(&self, user_id: &str) -> BillingResult<Option<MembershipProfile>> {
        Ok(self.lock().profiles.get(user_id).cloned())
    }

    async fn find_by_provider_customer_id(
        &self,
        provider: PaymentProvider,
        customer_id: &str,
    ) -> BillingResult<Option<MembershipProfile>> {
        let inner = self.lock();
        Ok(inner
            .profiles
            .values()
            .find(|p| match provider {
                PaymentProvider::Stripe => p.stripe_customer_id.as_deref() == Some(customer_id),
                PaymentProvider::LemonSqueezy => {
                    p.lemon_squeezy_customer_id.as_deref() == Some(customer_id)
                }
            })
            .cloned())
    }

    async fn upsert(&self, profile: &MembershipProfile) -> BillingResult<()> {
        self.lock()
            .profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn apply_subscription_state(
        &self,
        provider: PaymentProvider,
        customer_id: &str,
        subscription_id: &str,
        tier: MembershipTier,
    ) -> BillingResult<Option<MembershipProfile>> {
        let mut inner = self.lock();
        let profile = inner.profiles.values_mut().find(|p| match provider {
            PaymentProvider::Stripe => p.stripe_customer_id.as_deref() == Some(customer_id),
            PaymentProvider::LemonSqueezy => {
                p.lemon_squeezy_customer_id.as_deref() == Some(customer_id)
            }
        });
        Ok(profile.map(|p| {
            p.membership = tier;
            p.payment_provider = Some(provider);
            match provider {
                PaymentProvider::Stripe => {
                    p.stripe_subscription_id = Some(subscription_id.to_string());
                }
                PaymentProvider::LemonSqueezy => {
                    p.lemon_squeezy_subscription_id = Some(subscription_id.to_string());
                }
            }
            p.updated_at = time::OffsetDateTime::now_utc();
            p.clone()
        }))
    }

    async fn link_provider_customer(
        &self,
        user_id: &str,
        provider: PaymentProvider,
        customer_id: &str,
        subscription_id: Option<&str>,
        portal_url: Option<&str>,
    ) -> BillingResult<Option<MembershipProfile>> {
        let mut inner = self.lock();
        Ok(inner.profiles.get_mut(user_id).map(|p| {
            p.payment_provider = Some(provider);
            let subscription_id = subscription_id.map(str::to_string);
            match provider {
                PaymentProvider::Stripe => {
                    p.stripe_customer_id = Some(customer_id.to_string());
                    if subscription_id.is_some() {
                        p.stripe_subscription_id = subscription_id;
                    }
                }
                PaymentProvider::LemonSqueezy => {
                    p.lemon_squeezy_customer_id = Some(customer_id.to_string());
                    if subscription_id.is_some() {
                        p.lemon_squeezy_subscription_id = subscription_id;
                    }
                }
            }
            if let Some(url) = portal_url {
                p.customer_portal_url = Some(url.to_string());
            }
            p.updated_at = time::OffsetDateTime::now_utc();
            p.clone()
        }))
    }

    async fn claim_order(
        &self,
        order_key: &str,
        _user_id: &str,
        _credits: i32,
    ) -> BillingResult<bool> {
        Ok(self.lock().processed_orders.insert(order_key.to_string()))
    }

    async fn release_order(&self, order_key: &str) -> BillingResult<()> {
        self.lock().processed_orders.remove(order_key);
        Ok(())
    }

    async fn add_credits(
        &self,
        user_id: &str,
        amount: i32,
    ) -> BillingResult<Option<MembershipProfile>> {
        let mut inner = self.lock();
        Ok(inner.profiles.get_mut(user_id).map(|p| {
            p.credits += amount;
            let now = time::OffsetDateTime::now_utc();
            p.last_credit_purchase = Some(now);
            p.updated_at = now;
            p.clone()
        }))
    }
}
