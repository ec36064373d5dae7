//! Billing endpoints
//!
//! Checkout and customer portal links. The user id arrives in the request
//! body; session handling sits in the frontend gateway in front of this
//! service.

use axum::extract::State;
use axum::Json;
use craftpass_billing::PlanType;
use craftpass_shared::PaymentProvider;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub provider: PaymentProvider,
    pub plan: PlanType,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }

    let link = state
        .billing
        .checkout
        .create(request.provider, request.plan, &request.user_id)
        .await?;
    Ok(Json(json!({ "url": link.url })))
}

#[derive(Debug, Deserialize)]
pub struct PortalRequest {
    pub user_id: String,
}

pub async fn customer_portal(
    State(state): State<AppState>,
    Json(request): Json<PortalRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let url = state.billing.portal.portal_url(&request.user_id).await?;
    Ok(Json(json!({ "url": url })))
}
