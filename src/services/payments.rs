//! Payment lifecycle coordination.
//!
//! All state-transition rules for payments and the single place booking
//! state is derived from payment state. Client-initiated verification and
//! provider webhooks funnel into [`PaymentCoordinator::verify`], so the
//! record converges regardless of which signal arrives first, or whether
//! both do.
//!
//! No lock is held across provider calls: the record is read, the network
//! call is made, and the result is written back through a guarded update
//! that can only move status forward. COMPLETED is sticky; FAILED is not,
//! because a delayed provider success must still be able to confirm the
//! booking.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Booking, BookingStatus, Payment, PaymentStatus};
use crate::services::chapa::{
    ChapaClient, GatewayError, InitializeOutcome, InitializeParams, ProviderStatus, VerifyOutcome,
};
use crate::services::notifications::{NotificationTask, Notifier, PaymentOutcome};
use crate::services::Repository;

/// Map the provider's verification answer onto our payment status.
///
/// Unknown and pending provider states never regress a record; they leave
/// it PENDING until the provider says something definitive.
pub fn map_provider_status(status: ProviderStatus) -> PaymentStatus {
    match status {
        ProviderStatus::Success => PaymentStatus::Completed,
        ProviderStatus::Failed => PaymentStatus::Failed,
        ProviderStatus::Pending | ProviderStatus::Unknown => PaymentStatus::Pending,
    }
}

/// Result returned to the caller of initiate.
#[derive(Debug)]
pub struct InitiatedPayment {
    pub payment_reference: Uuid,
    pub checkout_url: String,
}

/// Result returned to the caller of verify / webhook handling.
#[derive(Debug)]
pub struct VerificationResult {
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
}

#[derive(Clone)]
pub struct PaymentCoordinator {
    repository: Repository,
    gateway: ChapaClient,
    notifier: Notifier,
    currency: String,
}

impl PaymentCoordinator {
    pub fn new(
        repository: Repository,
        gateway: ChapaClient,
        notifier: Notifier,
        currency: String,
    ) -> Self {
        Self {
            repository,
            gateway,
            notifier,
            currency,
        }
    }

    /// Start (or re-start) checkout for a booking.
    ///
    /// Idempotent per booking: the payment record and its reference are
    /// created once and reused on every later attempt. A gateway failure
    /// marks the payment FAILED for audit but leaves the booking alone.
    pub async fn initiate(
        &self,
        booking: &Booking,
        return_url: &str,
        callback_url: Option<&str>,
    ) -> Result<InitiatedPayment, AppError> {
        let payment = self
            .repository
            .get_or_create_payment(booking, &self.currency)
            .await
            .map_err(AppError::DatabaseError)?;

        let reference = payment.payment_reference.to_string();
        let (first_name, last_name) = split_contact_name(booking);

        let params = InitializeParams {
            reference: &reference,
            amount: payment.amount,
            currency: &payment.currency,
            email: booking.contact_email.as_deref().unwrap_or_default(),
            first_name: &first_name,
            last_name: &last_name,
            return_url,
            callback_url,
            description: format!("Payment for booking {}", booking.id),
            metadata: Some(serde_json::json!({
                "booking_id": booking.id,
                "listing_id": booking.listing_id,
            })),
        };

        match self.gateway.initialize(params).await {
            InitializeOutcome::Success { checkout_url, raw } => {
                self.repository
                    .record_initiation_success(&reference, &checkout_url, &raw)
                    .await
                    .map_err(AppError::DatabaseError)?;

                tracing::info!(
                    booking_id = %booking.id,
                    payment_reference = %reference,
                    "Payment initiated"
                );

                Ok(InitiatedPayment {
                    payment_reference: payment.payment_reference,
                    checkout_url,
                })
            }
            InitializeOutcome::Error(error) => {
                self.repository
                    .record_initiation_failure(&reference, error.raw.as_ref())
                    .await
                    .map_err(AppError::DatabaseError)?;

                log_gateway_error(&reference, "initiation", &error);
                Err(AppError::BadRequest(anyhow::anyhow!(
                    "Payment initiation failed: {}",
                    error.message
                )))
            }
        }
    }

    /// Ask the provider for the transaction's current state and reconcile
    /// the local record with the answer.
    pub async fn verify(&self, tx_ref: &str) -> Result<VerificationResult, AppError> {
        let payment = self
            .repository
            .get_payment_by_reference(tx_ref)
            .await
            .map_err(AppError::DatabaseError)?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        let previous_status = payment.status;

        // Provider call happens with no lock held; the guarded write below
        // tolerates the race with a concurrent verify.
        match self.gateway.verify(tx_ref).await {
            VerifyOutcome::Success {
                provider_status,
                transaction_id,
                provider_reference,
                raw,
            } => {
                let mapped = map_provider_status(provider_status);
                let effective = self
                    .repository
                    .apply_verification(
                        tx_ref,
                        mapped,
                        transaction_id.as_deref(),
                        provider_reference.as_deref(),
                        &raw,
                    )
                    .await
                    .map_err(AppError::DatabaseError)?
                    .unwrap_or(payment);

                let booking_status = self.settle_booking(&effective).await?;
                self.notify_if_settled(previous_status, &effective);

                Ok(VerificationResult {
                    payment_status: effective.status,
                    booking_status,
                })
            }
            VerifyOutcome::Error(error) => {
                if let Some(raw) = error.raw.as_ref() {
                    // Keep the provider's error body for audit; status is
                    // left exactly as it was before the call.
                    if let Err(e) = self.repository.record_provider_data(tx_ref, raw).await {
                        tracing::error!(tx_ref = %tx_ref, error = %e, "Failed to store provider error payload");
                    }
                }
                log_gateway_error(tx_ref, "verification", &error);
                Err(AppError::BadRequest(anyhow::anyhow!(
                    "Payment verification failed: {}",
                    error.message
                )))
            }
        }
    }

    /// Process a provider webhook. Delegates entirely to [`Self::verify`]
    /// so push and poll share one set of transition rules.
    pub async fn handle_webhook(
        &self,
        payload: &serde_json::Value,
    ) -> Result<VerificationResult, AppError> {
        let tx_ref = payload
            .get("tx_ref")
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Missing tx_ref in webhook payload"))
            })?;

        tracing::info!(tx_ref = %tx_ref, "Processing payment webhook");
        self.verify(tx_ref).await
    }

    /// Derive booking state from the effective payment state. A COMPLETED
    /// payment confirms the booking; nothing ever walks it backward.
    async fn settle_booking(&self, payment: &Payment) -> Result<BookingStatus, AppError> {
        if payment.status == PaymentStatus::Completed {
            self.repository
                .confirm_booking(payment.booking_id)
                .await
                .map_err(AppError::DatabaseError)?;
        }

        let booking = self
            .repository
            .get_booking(payment.booking_id)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(booking
            .map(|b| b.status)
            .unwrap_or(BookingStatus::Pending))
    }

    /// Fire-and-forget notification on a transition into a settled state.
    /// Re-verifying an already settled payment stays quiet.
    fn notify_if_settled(&self, previous: PaymentStatus, payment: &Payment) {
        if previous == payment.status {
            return;
        }
        let outcome = match payment.status {
            PaymentStatus::Completed => PaymentOutcome::Completed,
            PaymentStatus::Failed => PaymentOutcome::Failed,
            _ => return,
        };
        self.notifier.dispatch(NotificationTask::PaymentOutcome {
            booking_id: payment.booking_id,
            payment_id: payment.id,
            outcome,
        });
    }
}

fn split_contact_name(booking: &Booking) -> (String, String) {
    match booking.contact_name.as_deref() {
        Some(name) => match name.split_once(' ') {
            Some((first, last)) => (first.to_string(), last.to_string()),
            None => (name.to_string(), String::new()),
        },
        None => (booking.user_id.clone(), String::new()),
    }
}

fn log_gateway_error(reference: &str, operation: &str, error: &GatewayError) {
    // Transport vs provider distinction is preserved here for operators;
    // callers see one normalized failure.
    tracing::error!(
        tx_ref = %reference,
        kind = ?error.kind,
        message = %error.message,
        "Payment {operation} failed at the gateway"
    );
}
