use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::rpc::{degrade, RpcJson, Success};
use super::validation::{validate_id, validate_months};
use crate::db::{Payment, SubscriptionTier, User};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub tier: SubscriptionTier,
    pub months: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub payment_id: String,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub payment_id: String,
}

/// subscription.createPayment - open a pending payment for the pro tier
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcJson(request): RpcJson<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if request.tier != SubscriptionTier::Pro {
        errors.add("tier", "Only the pro tier can be purchased");
    }
    errors.check("months", validate_months(request.months));
    errors.finish()?;

    let payment = state
        .billing
        .create_payment(&user, request.tier, request.months)
        .await?;
    Ok(Json(CreatePaymentResponse {
        payment_id: payment.id,
        amount: payment.amount,
        currency: payment.currency,
    }))
}

/// subscription.confirmPayment - complete the payment and upgrade the caller
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    user: User,
    RpcJson(request): RpcJson<ConfirmPaymentRequest>,
) -> Result<Json<Success>, ApiError> {
    validate_id("paymentId", &request.payment_id)
        .map_err(|e| ApiError::validation_field("paymentId", e))?;

    state.billing.confirm_payment(&user, &request.payment_id).await?;
    Ok(Success::ok())
}

/// subscription.payments - the caller's payments, newest first
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let payments = degrade("subscription.payments", state.billing.payments(&user).await, Vec::new)?;
    Ok(Json(payments))
}
