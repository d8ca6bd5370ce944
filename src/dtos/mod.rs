use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Booking, BookingStatus, Listing, Payment, PaymentStatus, Review};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateListingRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 255))]
    pub location: String,
    pub price_per_night: Decimal,
    #[validate(range(min = 1))]
    pub max_guests: u32,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateListingRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub location: Option<String>,
    pub price_per_night: Option<Decimal>,
    #[validate(range(min = 1))]
    pub max_guests: Option<u32>,
    pub is_available: Option<bool>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_night: Decimal,
    pub max_guests: u32,
    pub is_available: bool,
    pub image_url: Option<String>,
    pub host_id: String,
    pub created_at: String,
}

impl From<Listing> for ListingResponse {
    fn from(listing: Listing) -> Self {
        Self {
            id: listing.id,
            title: listing.title,
            description: listing.description,
            location: listing.location,
            price_per_night: listing.price_per_night,
            max_guests: listing.max_guests,
            is_available: listing.is_available,
            image_url: listing.image_url,
            host_id: listing.host_id,
            created_at: listing.created_at.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub listing_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[validate(range(min = 1))]
    pub guests: u32,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub user_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub created_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            listing_id: booking.listing_id,
            user_id: booking.user_id,
            check_in: booking.check_in,
            check_out: booking.check_out,
            guests: booking.guests,
            total_price: booking.total_price,
            status: booking.status,
            created_at: booking.created_at.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub user_id: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: String,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            listing_id: review.listing_id,
            user_id: review.user_id,
            rating: review.rating,
            comment: review.comment,
            created_at: review.created_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub payment_reference: Uuid,
    pub transaction_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub checkout_url: Option<String>,
    pub created_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            booking_id: payment.booking_id,
            payment_reference: payment.payment_reference,
            transaction_id: payment.transaction_id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            checkout_url: payment.checkout_url,
            created_at: payment.created_at.to_string(),
        }
    }
}
