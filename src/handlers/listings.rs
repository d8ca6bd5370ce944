//! Listing CRUD. Reads are open; writes require an actor, and mutation is
//! restricted to the listing's host or a privileged actor.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::DateTime;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateListingRequest, ListingResponse, UpdateListingRequest};
use crate::error::AppError;
use crate::middleware::Actor;
use crate::models::{Listing, ListingPatch};
use crate::startup::AppState;

pub async fn list_listings(
    State(state): State<AppState>,
) -> Result<Json<Vec<ListingResponse>>, AppError> {
    let listings = state
        .repository
        .list_listings()
        .await
        .map_err(AppError::DatabaseError)?;
    Ok(Json(listings.into_iter().map(ListingResponse::from).collect()))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<ListingResponse>, AppError> {
    let listing = state
        .repository
        .get_listing(listing_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Listing not found")))?;
    Ok(Json(ListingResponse::from(listing)))
}

pub async fn create_listing(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<ListingResponse>), AppError> {
    payload.validate()?;

    if payload.price_per_night < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "price_per_night must not be negative"
        )));
    }

    let now = DateTime::now();
    let listing = Listing {
        id: Uuid::new_v4(),
        title: payload.title,
        description: payload.description,
        location: payload.location,
        price_per_night: payload.price_per_night,
        max_guests: payload.max_guests,
        is_available: true,
        image_url: payload.image_url,
        host_id: actor.user_id,
        created_at: now,
        updated_at: now,
    };

    state
        .repository
        .create_listing(listing.clone())
        .await
        .map_err(AppError::DatabaseError)?;

    tracing::info!(listing_id = %listing.id, "Listing created");

    Ok((StatusCode::CREATED, Json(ListingResponse::from(listing))))
}

pub async fn update_listing(
    State(state): State<AppState>,
    actor: Actor,
    Path(listing_id): Path<Uuid>,
    Json(payload): Json<UpdateListingRequest>,
) -> Result<Json<ListingResponse>, AppError> {
    payload.validate()?;

    if matches!(payload.price_per_night, Some(price) if price < Decimal::ZERO) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "price_per_night must not be negative"
        )));
    }

    let listing = state
        .repository
        .get_listing(listing_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Listing not found")))?;

    if !actor.can_access(&listing.host_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!("Permission denied")));
    }

    let patch = ListingPatch {
        title: payload.title,
        description: payload.description,
        location: payload.location,
        price_per_night: payload.price_per_night,
        max_guests: payload.max_guests,
        is_available: payload.is_available,
        image_url: payload.image_url,
    };

    let updated = state
        .repository
        .update_listing(listing_id, patch)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Listing not found")))?;

    Ok(Json(ListingResponse::from(updated)))
}

pub async fn delete_listing(
    State(state): State<AppState>,
    actor: Actor,
    Path(listing_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let listing = state
        .repository
        .get_listing(listing_id)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Listing not found")))?;

    if !actor.can_access(&listing.host_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!("Permission denied")));
    }

    state
        .repository
        .delete_listing(listing_id)
        .await
        .map_err(AppError::DatabaseError)?;

    tracing::info!(listing_id = %listing_id, "Listing deleted");
    Ok(StatusCode::NO_CONTENT)
}
