//! Booking CRUD. Creation computes the total price from the listing's
//! nightly rate and snapshots the actor's contact details for later
//! notifications; creation also enqueues a booking-received email.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::DateTime;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{BookingResponse, CreateBookingRequest};
use crate::error::AppError;
use crate::middleware::Actor;
use crate::models::{Booking, BookingStatus};
use crate::services::notifications::NotificationTask;
use crate::startup::AppState;

pub async fn list_bookings(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let scope = if actor.is_privileged {
        None
    } else {
        Some(actor.user_id.as_str())
    };
    let bookings = state
        .repository
        .list_bookings(scope)
        .await
        .map_err(AppError::DatabaseError)?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

pub async fn get_booking(
    State(state): State<AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .repository
        .get_booking(booking_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    if !actor.can_access(&booking.user_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!("Permission denied")));
    }

    Ok(Json(BookingResponse::from(booking)))
}

pub async fn create_booking(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    payload.validate()?;

    if payload.check_in >= payload.check_out {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "check_in must be before check_out"
        )));
    }

    let listing = state
        .repository
        .get_listing(payload.listing_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Listing not found")))?;

    if !listing.is_available {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Listing is not available for booking"
        )));
    }

    if payload.guests > listing.max_guests {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Listing accommodates at most {} guests",
            listing.max_guests
        )));
    }

    let nights = (payload.check_out - payload.check_in).num_days();
    let total_price = listing.price_per_night * Decimal::from(nights);

    let now = DateTime::now();
    let booking = Booking {
        id: Uuid::new_v4(),
        listing_id: listing.id,
        user_id: actor.user_id.clone(),
        contact_email: actor.email.clone(),
        contact_name: actor.display_name.clone(),
        check_in: payload.check_in,
        check_out: payload.check_out,
        guests: payload.guests,
        total_price,
        status: BookingStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    state
        .repository
        .create_booking(booking.clone())
        .await
        .map_err(AppError::DatabaseError)?;

    tracing::info!(
        booking_id = %booking.id,
        listing_id = %listing.id,
        user_id = %actor.user_id,
        "Booking created"
    );

    state
        .notifier
        .dispatch(NotificationTask::BookingCreated {
            booking_id: booking.id,
        });

    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

/// POST /bookings/:id/cancel — PENDING bookings only.
pub async fn cancel_booking(
    State(state): State<AppState>,
    actor: Actor,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .repository
        .get_booking(booking_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    if !actor.can_access(&booking.user_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!("Permission denied")));
    }

    let cancelled = state
        .repository
        .cancel_booking(booking_id)
        .await
        .map_err(AppError::DatabaseError)?;

    if !cancelled {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Only pending bookings can be cancelled"
        )));
    }

    let booking = state
        .repository
        .get_booking(booking_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    tracing::info!(booking_id = %booking_id, "Booking cancelled");
    Ok(Json(BookingResponse::from(booking)))
}
