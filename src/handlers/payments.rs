//! Payment endpoints: initiation, verification, provider webhook, and the
//! actor-scoped read model.
//!
//! These handlers are a thin boundary: input validation and ownership
//! checks live here, every transition rule lives in the coordinator.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::PaymentResponse;
use crate::error::AppError;
use crate::middleware::Actor;
use crate::models::{BookingStatus, PaymentStatus};
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    pub booking_id: Uuid,
    #[validate(url)]
    pub return_url: String,
    #[validate(url)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub message: String,
    pub payment_reference: Uuid,
    pub checkout_url: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub tx_ref: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub message: String,
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

/// POST /payments/initiate
pub async fn initiate_payment(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<InitiatePaymentResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        booking_id = %payload.booking_id,
        user_id = %actor.user_id,
        "Initiating payment"
    );

    let booking = state
        .repository
        .get_booking(payload.booking_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    if !actor.can_access(&booking.user_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!("Permission denied")));
    }

    if booking.status != BookingStatus::Pending {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Booking is not in a valid state for payment"
        )));
    }

    let initiated = state
        .coordinator
        .initiate(
            &booking,
            &payload.return_url,
            payload.callback_url.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InitiatePaymentResponse {
            message: "Payment initiated successfully".to_string(),
            payment_reference: initiated.payment_reference,
            checkout_url: initiated.checkout_url,
        }),
    ))
}

/// POST /payments/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    if payload.tx_ref.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("tx_ref is required")));
    }

    tracing::info!(tx_ref = %payload.tx_ref, user_id = %actor.user_id, "Verifying payment");

    let result = state.coordinator.verify(&payload.tx_ref).await?;

    Ok(Json(VerifyPaymentResponse {
        message: "Payment verification completed".to_string(),
        payment_status: result.payment_status,
        booking_status: result.booking_status,
    }))
}

/// POST /payments/webhook
///
/// No caller identity here; the provider retries on non-2xx, so every
/// failure mode must come back as a definite response rather than a hang
/// or a crash.
pub async fn chapa_webhook(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<WebhookResponse>, AppError> {
    let payload: serde_json::Value = serde_json::from_str(&body)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid JSON")))?;

    // An unknown reference is a client error on this route: the provider
    // should stop retrying, not probe for resource existence.
    state
        .coordinator
        .handle_webhook(&payload)
        .await
        .map_err(|e| match e {
            AppError::NotFound(cause) => AppError::BadRequest(cause),
            other => other,
        })?;

    Ok(Json(WebhookResponse {
        message: "Webhook processed successfully".to_string(),
    }))
}

/// GET /payments — the actor's own payments, or all for privileged actors.
pub async fn list_payments(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    let payments = if actor.is_privileged {
        state.repository.list_payments().await
    } else {
        state.repository.list_payments_for_user(&actor.user_id).await
    }
    .map_err(AppError::DatabaseError)?;

    Ok(Json(payments.into_iter().map(PaymentResponse::from).collect()))
}

/// GET /payments/:id
pub async fn get_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .repository
        .get_payment(payment_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    let booking = state
        .repository
        .get_booking(payment.booking_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    if !actor.can_access(&booking.user_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!("Permission denied")));
    }

    Ok(Json(PaymentResponse::from(payment)))
}
