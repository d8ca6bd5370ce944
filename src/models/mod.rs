use chrono::NaiveDate;
use mongodb::bson::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Round-trip `Uuid` as its hyphenated string in every data format. BSON
/// would otherwise store these fields as binary, which the repository's
/// string-based query filters could never match.
mod uuid_as_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(uuid)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(D::Error::custom)
    }
}

/// A property available for booking.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Listing {
    #[serde(rename = "_id", with = "uuid_as_string")]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_night: Decimal,
    pub max_guests: u32,
    pub is_available: bool,
    pub image_url: Option<String>,
    pub host_id: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Partial update to a listing; `None` fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price_per_night: Option<Decimal>,
    pub max_guests: Option<u32>,
    pub is_available: Option<bool>,
    pub image_url: Option<String>,
}

/// A stay request against a listing.
///
/// Created PENDING; moves to CONFIRMED only through a successful payment
/// verification. The contact fields are a snapshot of the booking owner
/// taken at creation so the webhook path can notify without an actor.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", with = "uuid_as_string")]
    pub id: Uuid,
    #[serde(with = "uuid_as_string")]
    pub listing_id: Uuid,
    pub user_id: String,
    pub contact_email: Option<String>,
    pub contact_name: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A guest review of a listing, one per (listing, user).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub listing_id: Uuid,
    pub user_id: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Record of one Chapa payment attempt per booking.
///
/// `payment_reference` is generated once at creation and used as the
/// provider-side transaction reference. A second initiation against the
/// same booking reuses this record and its reference.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub booking_id: Uuid,
    /// Client-generated correlation key sent to Chapa as `tx_ref`.
    pub payment_reference: Uuid,
    /// Provider-assigned transaction id, set once verification succeeds.
    pub transaction_id: Option<String>,
    /// Provider-side secondary reference reported by verification.
    pub provider_reference: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub checkout_url: Option<String>,
    /// Raw provider response, kept for audit and debugging.
    pub provider_data: Option<serde_json::Value>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}
