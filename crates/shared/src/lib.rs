// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Craftpass Shared Types
//!
//! Domain types and database helpers shared between the API server and the
//! billing crate. The membership profile is the only durable entity in the
//! system; everything else that flows through a webhook is ephemeral.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{MembershipProfile, MembershipTier, PaymentProvider};
