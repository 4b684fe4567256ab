use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{review, user, venue};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::utils::validation::require_text;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i32,
    pub comment: String,
}

impl ReviewRequest {
    fn validate(&self) -> AppResult<String> {
        if !(1..=5).contains(&self.rating) {
            return Err(AppError::BadRequest("Rating must be between 1 and 5".to_string()));
        }
        require_text("Comment", &self.comment, 1000)
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl ReviewResponse {
    fn new(r: review::Model, user_name: String) -> Self {
        Self {
            id: r.id,
            venue_id: r.venue_id,
            user_id: r.user_id,
            user_name,
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at.with_timezone(&Utc),
        }
    }
}

/// Mean rating rounded to one decimal, 0 when there are no ratings
pub fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let mean = ratings.iter().map(|&r| r as f64).sum::<f64>() / ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// Recompute the venue's cached rating from its reviews
async fn refresh_venue_rating<C: ConnectionTrait>(db: &C, venue_id: Uuid) -> AppResult<()> {
    let ratings: Vec<i32> = review::Entity::find()
        .filter(review::Column::VenueId.eq(venue_id))
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.rating)
        .collect();

    if let Some(venue) = venue::Entity::find_by_id(venue_id).one(db).await? {
        let mut active: venue::ActiveModel = venue.into();
        active.avg_rating = Set(average_rating(&ratings));
        active.review_count = Set(ratings.len() as i32);
        active.update(db).await?;
    }

    Ok(())
}

/// Reviews of a venue, newest first
pub async fn venue_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ReviewResponse>>> {
    let rows = review::Entity::find()
        .filter(review::Column::VenueId.eq(id))
        .order_by_desc(review::Column::CreatedAt)
        .find_also_related(user::Entity)
        .all(&state.db)
        .await?;

    let responses = rows
        .into_iter()
        .map(|(r, u)| ReviewResponse::new(r, u.map(|u| u.name).unwrap_or_default()))
        .collect();

    Ok(Json(responses))
}

/// Review a venue; one review per customer per venue
pub async fn create_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<(StatusCode, Json<ReviewResponse>)> {
    let comment = payload.validate()?;

    let venue = venue::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Venue not found".to_string()))?;

    let existing = review::Entity::find()
        .filter(review::Column::VenueId.eq(venue.id))
        .filter(review::Column::UserId.eq(claims.sub))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "You have already reviewed this venue".to_string(),
        ));
    }

    let author = user::Entity::find_by_id(claims.sub).one(&state.db).await?;

    let txn = state.db.begin().await?;
    let new_review = review::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(claims.sub),
        venue_id: Set(venue.id),
        rating: Set(payload.rating),
        comment: Set(comment),
        ..Default::default()
    };
    let review = new_review.insert(&txn).await?;
    refresh_venue_rating(&txn, venue.id).await?;
    txn.commit().await?;

    tracing::info!(review_id = %review.id, venue_id = %venue.id, rating = review.rating, "Review created");

    Ok((
        StatusCode::CREATED,
        Json(ReviewResponse::new(review, author.map(|u| u.name).unwrap_or_default())),
    ))
}

async fn own_review(state: &AppState, id: Uuid, user_id: Uuid) -> AppResult<review::Model> {
    let review = review::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    if review.user_id != user_id {
        return Err(AppError::Forbidden("You can only modify your own reviews".to_string()));
    }

    Ok(review)
}

pub async fn update_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> AppResult<Json<ReviewResponse>> {
    let comment = payload.validate()?;
    let review = own_review(&state, id, claims.sub).await?;
    let author = user::Entity::find_by_id(claims.sub).one(&state.db).await?;

    let txn = state.db.begin().await?;
    let mut active: review::ActiveModel = review.into();
    active.rating = Set(payload.rating);
    active.comment = Set(comment);
    let review = active.update(&txn).await?;
    refresh_venue_rating(&txn, review.venue_id).await?;
    txn.commit().await?;

    Ok(Json(ReviewResponse::new(review, author.map(|u| u.name).unwrap_or_default())))
}

pub async fn delete_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let review = own_review(&state, id, claims.sub).await?;

    let txn = state.db.begin().await?;
    review::Entity::delete_by_id(review.id).exec(&txn).await?;
    refresh_venue_rating(&txn, review.venue_id).await?;
    txn.commit().await?;

    Ok(Json(serde_json::json!({ "message": "Review deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[5]), 5.0);
        assert_eq!(average_rating(&[4, 5, 5]), 4.7);
        assert_eq!(average_rating(&[1, 2]), 1.5);
    }

    #[test]
    fn test_rating_bounds() {
        let req = |rating| ReviewRequest {
            rating,
            comment: "Good turf".to_string(),
        };
        assert!(req(0).validate().is_err());
        assert!(req(6).validate().is_err());
        assert_eq!(req(3).validate().unwrap(), "Good turf");

        let blank = ReviewRequest {
            rating: 4,
            comment: "   ".to_string(),
        };
        assert!(blank.validate().is_err());
    }
}
