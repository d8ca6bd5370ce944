//! Outbound email notifications.
//!
//! Payment operations enqueue tasks on an unbounded channel and return
//! immediately; a single worker drains the queue and talks SMTP. Delivery
//! failures are logged and never reach the enqueuing caller, so a broken
//! mail relay cannot affect payment or booking state.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::models::{Booking, Listing, Payment};
use crate::services::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed,
    Failed,
}

#[derive(Debug)]
pub enum NotificationTask {
    BookingCreated {
        booking_id: Uuid,
    },
    PaymentOutcome {
        booking_id: Uuid,
        payment_id: Uuid,
        outcome: PaymentOutcome,
    },
}

/// Cloneable producer handle. Enqueuing never blocks and never fails the
/// caller; a closed channel is logged and the task dropped.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationTask>,
}

impl Notifier {
    pub fn dispatch(&self, task: NotificationTask) {
        if self.tx.send(task).is_err() {
            tracing::error!("Notification worker is gone; dropping notification task");
        }
    }
}

/// Consumes the queue and sends email. Spawned once at startup.
pub struct NotificationWorker {
    rx: mpsc::UnboundedReceiver<NotificationTask>,
    repository: Repository,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    config: SmtpConfig,
}

/// Build the producer/consumer pair.
pub fn channel(repository: Repository, config: SmtpConfig) -> Result<(Notifier, NotificationWorker)> {
    let transport = if config.enabled {
        let credentials = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("failed to create SMTP relay")?
            .port(config.port)
            .credentials(credentials)
            .build();
        Some(transport)
    } else {
        None
    };

    let (tx, rx) = mpsc::unbounded_channel();
    Ok((
        Notifier { tx },
        NotificationWorker {
            rx,
            repository,
            transport,
            config,
        },
    ))
}

impl NotificationWorker {
    pub async fn run(mut self) {
        tracing::info!(
            smtp_enabled = self.config.enabled,
            "Notification worker started"
        );
        while let Some(task) = self.rx.recv().await {
            if let Err(e) = self.handle(task).await {
                tracing::error!(error = %e, "Failed to process notification task");
            }
        }
        tracing::info!("Notification channel closed; worker stopping");
    }

    async fn handle(&self, task: NotificationTask) -> Result<()> {
        match task {
            NotificationTask::BookingCreated { booking_id } => {
                let (booking, listing) = self.load_booking(booking_id).await?;
                let subject = format!("Booking Received - {}", listing.title);
                let body = booking_created_body(&booking, &listing);
                self.send(&booking, &subject, body).await
            }
            NotificationTask::PaymentOutcome {
                booking_id,
                payment_id,
                outcome,
            } => {
                let (booking, listing) = self.load_booking(booking_id).await?;
                let payment = self
                    .repository
                    .get_payment(payment_id)
                    .await?
                    .with_context(|| format!("payment {payment_id} not found"))?;

                let (subject, body) = match outcome {
                    PaymentOutcome::Completed => (
                        format!("Booking Confirmation - {}", listing.title),
                        payment_completed_body(&booking, &listing, &payment),
                    ),
                    PaymentOutcome::Failed => (
                        format!("Payment Failed - {}", listing.title),
                        payment_failed_body(&booking, &listing, &payment),
                    ),
                };
                self.send(&booking, &subject, body).await
            }
        }
    }

    async fn load_booking(&self, booking_id: Uuid) -> Result<(Booking, Listing)> {
        let booking = self
            .repository
            .get_booking(booking_id)
            .await?
            .with_context(|| format!("booking {booking_id} not found"))?;
        let listing = self
            .repository
            .get_listing(booking.listing_id)
            .await?
            .with_context(|| format!("listing {} not found", booking.listing_id))?;
        Ok((booking, listing))
    }

    async fn send(&self, booking: &Booking, subject: &str, body: String) -> Result<()> {
        let Some(recipient) = booking.contact_email.as_deref() else {
            tracing::warn!(
                booking_id = %booking.id,
                "Booking has no contact email; skipping notification"
            );
            return Ok(());
        };

        let Some(transport) = self.transport.as_ref() else {
            tracing::info!(
                booking_id = %booking.id,
                recipient = %recipient,
                subject = %subject,
                "Email delivery disabled; skipping send"
            );
            return Ok(());
        };

        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .context("invalid from address")?;
        let to: Mailbox = recipient.parse().context("invalid recipient address")?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .context("failed to build message")?;

        transport
            .send(message)
            .await
            .context("failed to send email")?;

        tracing::info!(
            booking_id = %booking.id,
            recipient = %recipient,
            subject = %subject,
            "Notification email sent"
        );
        Ok(())
    }
}

fn greeting(booking: &Booking) -> String {
    booking
        .contact_name
        .clone()
        .unwrap_or_else(|| "traveler".to_string())
}

fn booking_details(booking: &Booking, listing: &Listing) -> String {
    format!(
        "Property: {}\n\
         Location: {}\n\
         Check-in: {}\n\
         Check-out: {}\n\
         Guests: {}\n",
        listing.title, listing.location, booking.check_in, booking.check_out, booking.guests
    )
}

fn booking_created_body(booking: &Booking, listing: &Listing) -> String {
    format!(
        "Dear {},\n\n\
         We received your booking request. Complete the payment to confirm it.\n\n\
         {}\
         Total: {} \n\n\
         Best regards,\nThe Staybook Team\n",
        greeting(booking),
        booking_details(booking, listing),
        booking.total_price,
    )
}

fn payment_completed_body(booking: &Booking, listing: &Listing, payment: &Payment) -> String {
    format!(
        "Dear {},\n\n\
         Your payment has been successfully processed. Here are your booking details:\n\n\
         {}\
         Total Amount: {} {}\n\
         Payment Reference: {}\n\n\
         Thank you for choosing Staybook!\n\n\
         Best regards,\nThe Staybook Team\n",
        greeting(booking),
        booking_details(booking, listing),
        payment.amount,
        payment.currency,
        payment.payment_reference,
    )
}

fn payment_failed_body(booking: &Booking, listing: &Listing, payment: &Payment) -> String {
    format!(
        "Dear {},\n\n\
         Unfortunately, your payment for the following booking could not be processed:\n\n\
         {}\
         Total Amount: {} {}\n\
         Payment Reference: {}\n\n\
         Please try again or contact our support team if the problem persists.\n\n\
         Best regards,\nThe Staybook Team\n",
        greeting(booking),
        booking_details(booking, listing),
        payment.amount,
        payment.currency,
        payment.payment_reference,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, PaymentStatus};
    use mongodb::bson::DateTime;

    fn sample_booking() -> Booking {
        Booking {
            id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            contact_email: Some("guest@example.com".to_string()),
            contact_name: Some("Abel".to_string()),
            check_in: "2026-09-01".parse().unwrap(),
            check_out: "2026-09-04".parse().unwrap(),
            guests: 2,
            total_price: "1500.00".parse().unwrap(),
            status: BookingStatus::Pending,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    fn sample_listing(id: Uuid) -> Listing {
        Listing {
            id,
            title: "Lakeside Cabin".to_string(),
            description: String::new(),
            location: "Bahir Dar".to_string(),
            price_per_night: "500.00".parse().unwrap(),
            max_guests: 4,
            is_available: true,
            image_url: None,
            host_id: "host-1".to_string(),
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    fn sample_payment(booking_id: Uuid) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            booking_id,
            payment_reference: Uuid::new_v4(),
            transaction_id: None,
            provider_reference: None,
            amount: "1500.00".parse().unwrap(),
            currency: "ETB".to_string(),
            status: PaymentStatus::Pending,
            checkout_url: None,
            provider_data: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn completed_body_includes_booking_and_payment_facts() {
        let booking = sample_booking();
        let listing = sample_listing(booking.listing_id);
        let payment = sample_payment(booking.id);

        let body = payment_completed_body(&booking, &listing, &payment);
        assert!(body.contains("Dear Abel"));
        assert!(body.contains("Lakeside Cabin"));
        assert!(body.contains("1500.00 ETB"));
        assert!(body.contains(&payment.payment_reference.to_string()));
    }

    #[test]
    fn greeting_falls_back_without_contact_name() {
        let mut booking = sample_booking();
        booking.contact_name = None;
        assert_eq!(greeting(&booking), "traveler");
    }
}
