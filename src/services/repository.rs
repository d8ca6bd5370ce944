//! MongoDB persistence for listings, bookings, reviews and payments.
//!
//! Payment rows carry unique indexes on `booking_id` and
//! `payment_reference`; `get_or_create_payment` leans on the former so a
//! concurrent duplicate creation loses the insert race and re-fetches
//! instead of producing a second row.

use anyhow::Result;
use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};
use uuid::Uuid;

use crate::models::{
    Booking, BookingStatus, Listing, ListingPatch, Payment, PaymentStatus, Review,
};

#[derive(Clone)]
pub struct Repository {
    listings: Collection<Listing>,
    bookings: Collection<Booking>,
    reviews: Collection<Review>,
    payments: Collection<Payment>,
}

fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(write_error))
            if write_error.code == 11000
    )
}

impl Repository {
    pub fn new(db: &Database) -> Self {
        Self {
            listings: db.collection("listings"),
            bookings: db.collection("bookings"),
            reviews: db.collection("reviews"),
            payments: db.collection("payments"),
        }
    }

    /// Create the unique indexes the write paths rely on.
    pub async fn init_indexes(&self) -> Result<()> {
        let booking_unique = IndexModel::builder()
            .keys(doc! { "booking_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_booking_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let reference_unique = IndexModel::builder()
            .keys(doc! { "payment_reference": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_reference_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.payments
            .create_indexes([booking_unique, reference_unique], None)
            .await?;

        let review_unique = IndexModel::builder()
            .keys(doc! { "listing_id": 1, "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("review_listing_user_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.reviews.create_indexes([review_unique], None).await?;

        let booking_user = IndexModel::builder()
            .keys(doc! { "user_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("booking_user_idx".to_string())
                    .build(),
            )
            .build();

        self.bookings.create_indexes([booking_user], None).await?;

        tracing::info!("Database indexes initialized");
        Ok(())
    }

    // ---- listings ----

    pub async fn create_listing(&self, listing: Listing) -> Result<()> {
        self.listings.insert_one(listing, None).await?;
        Ok(())
    }

    pub async fn list_listings(&self) -> Result<Vec<Listing>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self.listings.find(None, Some(options)).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        let filter = doc! { "_id": id.to_string() };
        Ok(self.listings.find_one(filter, None).await?)
    }

    pub async fn update_listing(&self, id: Uuid, patch: ListingPatch) -> Result<Option<Listing>> {
        let mut set = Document::new();
        if let Some(title) = patch.title {
            set.insert("title", title);
        }
        if let Some(description) = patch.description {
            set.insert("description", description);
        }
        if let Some(location) = patch.location {
            set.insert("location", location);
        }
        if let Some(price) = patch.price_per_night {
            set.insert("price_per_night", mongodb::bson::to_bson(&price)?);
        }
        if let Some(max_guests) = patch.max_guests {
            set.insert("max_guests", max_guests as i64);
        }
        if let Some(is_available) = patch.is_available {
            set.insert("is_available", is_available);
        }
        if let Some(image_url) = patch.image_url {
            set.insert("image_url", image_url);
        }
        set.insert("updated_at", DateTime::now());

        let filter = doc! { "_id": id.to_string() };
        self.listings
            .update_one(filter.clone(), doc! { "$set": set }, None)
            .await?;
        Ok(self.listings.find_one(filter, None).await?)
    }

    pub async fn delete_listing(&self, id: Uuid) -> Result<bool> {
        let result = self
            .listings
            .delete_one(doc! { "_id": id.to_string() }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    // ---- bookings ----

    pub async fn create_booking(&self, booking: Booking) -> Result<()> {
        self.bookings.insert_one(booking, None).await?;
        Ok(())
    }

    pub async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        let filter = doc! { "_id": id.to_string() };
        Ok(self.bookings.find_one(filter, None).await?)
    }

    /// List bookings, scoped to one user unless `user_id` is `None`.
    pub async fn list_bookings(&self, user_id: Option<&str>) -> Result<Vec<Booking>> {
        let filter = user_id.map(|uid| doc! { "user_id": uid });
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self.bookings.find(filter, Some(options)).await?;
        Ok(cursor.try_collect().await?)
    }

    /// PENDING -> CANCELLED. Returns false when the booking was not in a
    /// cancellable state.
    pub async fn cancel_booking(&self, id: Uuid) -> Result<bool> {
        let filter = doc! {
            "_id": id.to_string(),
            "status": mongodb::bson::to_bson(&BookingStatus::Pending)?,
        };
        let update = doc! {
            "$set": {
                "status": mongodb::bson::to_bson(&BookingStatus::Cancelled)?,
                "updated_at": DateTime::now(),
            }
        };
        let result = self.bookings.update_one(filter, update, None).await?;
        Ok(result.modified_count > 0)
    }

    /// Derive CONFIRMED from a completed payment. Idempotent; this is the
    /// only write path that confirms a booking.
    pub async fn confirm_booking(&self, id: Uuid) -> Result<()> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! {
            "$set": {
                "status": mongodb::bson::to_bson(&BookingStatus::Confirmed)?,
                "updated_at": DateTime::now(),
            }
        };
        self.bookings.update_one(filter, update, None).await?;
        Ok(())
    }

    // ---- reviews ----

    /// Insert a review; returns `None` when the (listing, user) pair
    /// already reviewed, surfaced by the unique index.
    pub async fn create_review(&self, review: Review) -> Result<Option<Review>> {
        match self.reviews.insert_one(&review, None).await {
            Ok(_) => Ok(Some(review)),
            Err(e) if is_duplicate_key_error(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_reviews(&self, listing_id: Uuid) -> Result<Vec<Review>> {
        let filter = doc! { "listing_id": listing_id.to_string() };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self.reviews.find(filter, Some(options)).await?;
        Ok(cursor.try_collect().await?)
    }

    // ---- payments ----

    /// Idempotent insert-or-fetch keyed by the unique `booking_id` index.
    ///
    /// An existing record is returned unchanged; amount and currency are
    /// fixed at first creation. A lost insert race re-fetches the winner's
    /// row instead of erroring.
    pub async fn get_or_create_payment(&self, booking: &Booking, currency: &str) -> Result<Payment> {
        let filter = doc! { "booking_id": booking.id.to_string() };
        if let Some(existing) = self.payments.find_one(filter.clone(), None).await? {
            return Ok(existing);
        }

        let now = DateTime::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            payment_reference: Uuid::new_v4(),
            transaction_id: None,
            provider_reference: None,
            amount: booking.total_price,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            checkout_url: None,
            provider_data: None,
            created_at: now,
            updated_at: now,
        };

        match self.payments.insert_one(&payment, None).await {
            Ok(_) => Ok(payment),
            Err(e) if is_duplicate_key_error(&e) => {
                // A concurrent initiation won the insert; use its record.
                self.payments
                    .find_one(filter, None)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("payment vanished after duplicate-key insert"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        let filter = doc! { "_id": id.to_string() };
        Ok(self.payments.find_one(filter, None).await?)
    }

    pub async fn get_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let filter = doc! { "payment_reference": reference };
        Ok(self.payments.find_one(filter, None).await?)
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self.payments.find(None, Some(options)).await?;
        Ok(cursor.try_collect().await?)
    }

    /// Payments scoped to the user's own bookings.
    pub async fn list_payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>> {
        let bookings = self.list_bookings(Some(user_id)).await?;
        let booking_ids: Vec<String> = bookings.iter().map(|b| b.id.to_string()).collect();
        if booking_ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = doc! { "booking_id": { "$in": booking_ids } };
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let cursor = self.payments.find(filter, Some(options)).await?;
        Ok(cursor.try_collect().await?)
    }

    /// Record a successful checkout initiation. Restores a previously
    /// FAILED attempt to PENDING; never touches a COMPLETED record.
    pub async fn record_initiation_success(
        &self,
        reference: &str,
        checkout_url: &str,
        raw: &serde_json::Value,
    ) -> Result<()> {
        let filter = doc! {
            "payment_reference": reference,
            "status": { "$ne": mongodb::bson::to_bson(&PaymentStatus::Completed)? },
        };
        let update = doc! {
            "$set": {
                "status": mongodb::bson::to_bson(&PaymentStatus::Pending)?,
                "checkout_url": checkout_url,
                "provider_data": mongodb::bson::to_bson(raw)?,
                "updated_at": DateTime::now(),
            }
        };
        self.payments.update_one(filter, update, None).await?;
        Ok(())
    }

    /// Record a failed initiation for audit without walking back a
    /// COMPLETED payment.
    pub async fn record_initiation_failure(
        &self,
        reference: &str,
        raw: Option<&serde_json::Value>,
    ) -> Result<()> {
        let mut set = doc! {
            "status": mongodb::bson::to_bson(&PaymentStatus::Failed)?,
            "updated_at": DateTime::now(),
        };
        if let Some(raw) = raw {
            set.insert("provider_data", mongodb::bson::to_bson(raw)?);
        }
        let filter = doc! {
            "payment_reference": reference,
            "status": { "$ne": mongodb::bson::to_bson(&PaymentStatus::Completed)? },
        };
        self.payments
            .update_one(filter, doc! { "$set": set }, None)
            .await?;
        Ok(())
    }

    /// Persist the raw provider payload for a verify attempt that produced
    /// no status decision.
    pub async fn record_provider_data(
        &self,
        reference: &str,
        raw: &serde_json::Value,
    ) -> Result<()> {
        let filter = doc! { "payment_reference": reference };
        let update = doc! {
            "$set": {
                "provider_data": mongodb::bson::to_bson(raw)?,
                "updated_at": DateTime::now(),
            }
        };
        self.payments.update_one(filter, update, None).await?;
        Ok(())
    }

    /// Apply a verification result and return the effective record.
    ///
    /// The raw payload is stored unconditionally; the status write is
    /// guarded so a COMPLETED record is never regressed, which keeps
    /// concurrent verifies forward-only.
    pub async fn apply_verification(
        &self,
        reference: &str,
        status: PaymentStatus,
        transaction_id: Option<&str>,
        provider_reference: Option<&str>,
        raw: &serde_json::Value,
    ) -> Result<Option<Payment>> {
        self.record_provider_data(reference, raw).await?;

        let mut set = doc! {
            "status": mongodb::bson::to_bson(&status)?,
            "updated_at": DateTime::now(),
        };
        if let Some(transaction_id) = transaction_id {
            set.insert("transaction_id", transaction_id);
        }
        if let Some(provider_reference) = provider_reference {
            set.insert("provider_reference", provider_reference);
        }

        let guarded = doc! {
            "payment_reference": reference,
            "status": { "$ne": mongodb::bson::to_bson(&PaymentStatus::Completed)? },
        };
        self.payments
            .update_one(guarded, doc! { "$set": set }, None)
            .await?;

        self.get_payment_by_reference(reference).await
    }
}
