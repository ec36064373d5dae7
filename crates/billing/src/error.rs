//! Billing error taxonomy
//!
//! Each reconciliation component has its own error enum so callers can
//! distinguish "reject the webhook" failures from "acknowledge and drop"
//! conditions. `BillingError` is the crate-level umbrella.

use craftpass_shared::PaymentProvider;
use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

/// Webhook signature verification failures.
///
/// Any of these rejects the whole request before a single downstream
/// component runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header or webhook secret missing")]
    Missing,
    #[error("webhook signature mismatch")]
    Mismatch,
    #[error("verified payload is not valid JSON: {0}")]
    Malformed(String),
}

/// Event classification failures inside a provider adapter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// Structured tier metadata exists but holds a value outside {free, pro}.
    #[error("invalid membership value in product metadata: {0:?}")]
    InvalidTierMetadata(String),
    /// The payload passed verification but lacks a field the allow-listed
    /// event type requires.
    #[error("unexpected payload shape for {event}: {detail}")]
    Payload {
        event: String,
        detail: String,
    },
}

/// Subscription reconciliation failures.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No profile holds this provider customer id. Webhooks never create
    /// profiles, so the delivery fails and the provider retries it.
    #[error("no profile linked to {provider} customer {customer_id}")]
    UnknownCustomer {
        provider: PaymentProvider,
        customer_id: String,
    },
    #[error("database error: {0}")]
    Database(String),
}

/// Customer-linking failures.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The order's custom data carries no user id. Logged and dropped.
    #[error("order payload has no user id in custom data")]
    MissingUserId,
    #[error("no profile found for user {0}")]
    ProfileNotFound(String),
    #[error("database error: {0}")]
    Database(String),
}

/// Credit ledger failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// This external order id was already credited. The webhook layer
    /// acknowledges it as success so the provider stops retrying.
    #[error("order {0} was already credited")]
    DuplicateOrder(String),
    #[error("credit amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("no profile found for user {0}")]
    UnknownUser(String),
    #[error("database error: {0}")]
    Database(String),
}

/// Crate-level billing error.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("stripe api error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("lemon squeezy api error: {0}")]
    LemonApi(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        BillingError::LemonApi(e.to_string())
    }
}
