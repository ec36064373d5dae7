// API server clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Craftpass API server
//!
//! HTTP surface for membership billing: webhook intake for Stripe and
//! Lemon Squeezy, plus checkout and customer portal endpoints.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use routes::create_router;
pub use state::AppState;
