//! Reviews nested under listings; one per (listing, user).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::DateTime;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateReviewRequest, ReviewResponse};
use crate::error::AppError;
use crate::middleware::Actor;
use crate::models::Review;
use crate::startup::AppState;

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<Vec<ReviewResponse>>, AppError> {
    let listing = state
        .repository
        .get_listing(listing_id)
        .await
        .map_err(AppError::DatabaseError)?;
    if listing.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!("Listing not found")));
    }

    let reviews = state
        .repository
        .list_reviews(listing_id)
        .await
        .map_err(AppError::DatabaseError)?;
    Ok(Json(reviews.into_iter().map(ReviewResponse::from).collect()))
}

pub async fn create_review(
    State(state): State<AppState>,
    actor: Actor,
    Path(listing_id): Path<Uuid>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), AppError> {
    payload.validate()?;

    let listing = state
        .repository
        .get_listing(listing_id)
        .await
        .map_err(AppError::DatabaseError)?;
    if listing.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!("Listing not found")));
    }

    let now = DateTime::now();
    let review = Review {
        id: Uuid::new_v4(),
        listing_id,
        user_id: actor.user_id.clone(),
        rating: payload.rating,
        comment: payload.comment,
        created_at: now,
        updated_at: now,
    };

    let created = state
        .repository
        .create_review(review)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!("You have already reviewed this listing"))
        })?;

    tracing::info!(
        listing_id = %listing_id,
        user_id = %actor.user_id,
        rating = created.rating,
        "Review created"
    );

    Ok((StatusCode::CREATED, Json(ReviewResponse::from(created))))
}
