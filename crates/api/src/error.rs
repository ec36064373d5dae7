//! API error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use craftpass_billing::error::LinkError;
use craftpass_billing::BillingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match &err {
            BillingError::Link(LinkError::ProfileNotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            // The provider should retry these after fixing its request, so
            // they surface as client errors.
            BillingError::Signature(_)
            | BillingError::Classify(_)
            | BillingError::Reconcile(_)
            | BillingError::Link(_)
            | BillingError::Ledger(_) => ApiError::BadRequest(err.to_string()),
            BillingError::Config(m) => ApiError::BadRequest(m.clone()),
            BillingError::Stripe(_)
            | BillingError::LemonApi(_)
            | BillingError::Database(_)
            | BillingError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}
